use thiserror::Error;

/// Errors raised while loading configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    Missing { key: &'static str },

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors returned by an account source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Connection to ledger node failed: {reason}")]
    Connection { reason: String },

    #[error("Ledger request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Ledger node returned RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed ledger response: {reason}")]
    Decode { reason: String },

    #[error("Account not found: {address}")]
    NotFound { address: String },
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Connection { .. } => "connection",
            SourceError::Timeout { .. } => "timeout",
            SourceError::Rpc { .. } => "rpc",
            SourceError::Decode { .. } => "decode",
            SourceError::NotFound { .. } => "not_found",
        }
    }
}

/// Errors raised when a snapshot cannot be mapped to flat metrics
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Required field `{field}` is missing")]
    MissingField { field: &'static str },

    #[error("Field `{field}` is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },

    #[error("Field `{field}` is not a finite number: {value}")]
    NonFinite { field: &'static str, value: f64 },
}

/// Errors raised when writing a sample into the metric registry.
/// These indicate a programming defect, never bad upstream data.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Unknown metric: {name}")]
    UnknownMetric { name: String },

    #[error("Rejected labels for {name}: {source}")]
    Labels {
        name: String,
        #[source]
        source: prometheus::Error,
    },
}

/// Failure of a single account within a poll cycle. Never escalates to the cycle.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Cycle deadline reached before the account was loaded")]
    DeadlineExceeded,

    #[error("Requested {requested} but ledger returned {returned}")]
    AddressMismatch { requested: String, returned: String },
}

impl AccountError {
    /// Stable label value used for failure counters
    pub fn kind(&self) -> &'static str {
        match self {
            AccountError::Source(e) => e.kind(),
            AccountError::Decode(_) => "decode",
            AccountError::DeadlineExceeded => "deadline",
            AccountError::AddressMismatch { .. } => "address_mismatch",
        }
    }
}

/// Failure that skips a whole poll cycle. The process keeps running.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to list accounts: {0}")]
    Source(#[from] SourceError),

    #[error("Account listing suspended: {0}")]
    CircuitOpen(String),
}
