// Account snapshots and label schema
pub mod account;

// Per-account gauge families
pub mod gauges;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
