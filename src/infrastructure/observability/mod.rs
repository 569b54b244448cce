//! Pull-based observability for the exporter
//!
//! Account figures and exporter self-metrics live in one Prometheus
//! [`MetricRegistry`]; an HTTP endpoint serves it to scrapers.

pub mod metrics;
pub mod server;

pub use metrics::{MetricRegistry, MetricSample};
