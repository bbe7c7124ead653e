//! Error types for the delivery module.

use thiserror::Error;

/// Errors that can occur during delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The overall retry deadline passed.
    #[error("delivery timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// Every attempt failed.
    #[error("delivery failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// The transport does not offer this operation.
    #[error("unsupported by transport: {0}")]
    Unsupported(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] parley_store::StoreError),

    /// The engine has been closed.
    #[error("delivery engine closed")]
    Closed,
}

impl DeliveryError {
    /// Whether this failure is a normal, reportable outcome of a publish
    /// rather than a fault.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Timeout { .. }
                | DeliveryError::Exhausted { .. }
                | DeliveryError::Transport(_)
        )
    }
}

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;
