//! Driver error type.

use thiserror::Error;

use eou_core::EouError;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// The ownership ledger caught a second owner or a second release.
    #[error("ownership audit failed: {0}")]
    Audit(#[from] EouError),
    /// A record was rejected under the configured safety level.
    #[error("record rejected: {0}")]
    Rejected(EouError),
    #[error("invalid configuration: {0}")]
    Config(String),
}
