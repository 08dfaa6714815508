//! Error taxonomy for the chunked transfer protocol.
//!
//! Every failure is surfaced synchronously to the caller. Nothing in Coffer
//! retries or backs off on its own; the caller decides whether to abort or
//! restart the whole transfer.

use thiserror::Error;

use crate::ids::HandleId;

/// Errors returned by backend calls and the transfer client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Malformed local input (negative size, zero-length read, oversized chunk).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing context, container, or object, or no read capability on it.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authorization failure or a failure reported by the backend.
    #[error("backend rejected request: {0}")]
    BackendRejected(String),

    /// The handle was already closed (or released by an abort).
    #[error("handle {0} is closed")]
    HandleClosed(HandleId),

    /// Bytes written do not match the size declared at open time.
    #[error("size mismatch: declared {declared} bytes, written {written}")]
    SizeMismatch { declared: u64, written: u64 },

    /// A background transfer observed its cancel flag between chunks.
    #[error("transfer cancelled")]
    Cancelled,
}

/// Coarse classification of a [`TransferError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    BackendRejected,
    HandleClosed,
    Cancelled,
}

impl TransferError {
    /// Size mismatches are reported by the backend at finalization, so they
    /// classify as `BackendRejected`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BackendRejected(_) | Self::SizeMismatch { .. } => ErrorKind::BackendRejected,
            Self::HandleClosed(_) => ErrorKind::HandleClosed,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::BackendRejected(msg.into())
    }
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;
