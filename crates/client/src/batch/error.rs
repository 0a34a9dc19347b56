//! Batch-level error taxonomy.

use rampart_core::Error;

/// Why a batched call was rejected.
///
/// `Clone` so a single transport failure can reject every call of the batch
/// with the same value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// The physical call failed as a whole.
    #[error("batch transport failed: {0}")]
    Transport(String),

    /// The server rejected this call; other calls in the batch are unaffected.
    #[error("call failed: {0}")]
    Item(String),

    /// The response could not be matched to this call.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The batcher stopped before the call was resolved.
    #[error("batcher closed")]
    Closed,
}

impl From<BatchError> for Error {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Transport(msg) => Error::BatchTransport(msg),
            BatchError::Item(msg) => Error::BatchItem(msg),
            BatchError::ProtocolViolation(msg) => Error::ProtocolViolation(msg),
            BatchError::Closed => Error::BatchTransport("batcher closed".into()),
        }
    }
}
