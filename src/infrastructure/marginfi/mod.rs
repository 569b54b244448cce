//! Marginfi ledger access.

pub mod client;

pub use client::RpcAccountSource;
