use thiserror::Error;

/// Topology engine errors.
///
/// Only mutation entry points fail. Queries return `Option` and an unroutable
/// pair is `None`, never an error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TopologyError {
    #[error("Ledger not found: '{0}'")]
    LedgerNotFound(String),

    #[error("Connector not found: '{0}'")]
    ConnectorNotFound(String),

    #[error("Claim '{claim}' not found on connector '{connector}'")]
    ClaimNotFound { connector: String, claim: String },

    #[error("Invalid loop interval: {0} ms")]
    InvalidInterval(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Engine service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl TopologyError {
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

pub type TopologyResult<T> = Result<T, TopologyError>;
