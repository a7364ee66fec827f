use thiserror::Error;

use crate::config::TxKind;

/// Failures that stop a run before any worker starts.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0:#}")]
    InvalidConfig(anyhow::Error),

    #[error("endpoint error: {0:#}")]
    Endpoint(anyhow::Error),

    #[error("{0} transactions are not supported by this endpoint")]
    UnsupportedKind(TxKind),
}
