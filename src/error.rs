//! Error taxonomy shared by the ledger, the traders and the desk.
//!
//! Glue code (CLI, wiring, exchange clients) uses `anyhow`; everything the
//! command surface and the tick loop can report goes through [`EngineError`].

use thiserror::Error;

/// Errors surfaced by the engine core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unknown trader name or entry id.
    #[error("{0} is not found")]
    NotFound(String),

    /// An id collided with an existing entry. Only a broken id generator or a
    /// doubly-recovered ledger record can cause this.
    #[error("entry id already exists: '{0}'")]
    DuplicateId(String),

    /// The underlying store failed; the operation was aborted.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A persisted record could not be decoded.
    #[error("corrupt ledger record '{id}': {reason}")]
    DecodeError { id: String, reason: String },

    /// Transport failure or rejection from the order gateway.
    #[error("gateway error: {0}")]
    GatewayError(String),

    /// A required capability was never supplied.
    #[error("{0} is not configured")]
    NotConfigured(String),

    /// A size or price is too large for the P&L arithmetic.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// The ledger has been closed.
    #[error("ledger is closed")]
    Closed,
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed => EngineError::Closed,
            other => EngineError::StorageUnavailable(other.to_string()),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
