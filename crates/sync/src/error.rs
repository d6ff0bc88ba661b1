/// Errors from a deployment synchronization session.
///
/// Every variant is session-fatal: the session reports it and releases the
/// connection, it never retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("indexing failed: {0}")]
    Index(#[from] stratus_indexer::IndexError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("transfer of {path} failed: {reason}")]
    Transfer { path: String, reason: String },

    #[error("finalization failed: {0}")]
    Finalization(String),

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("cancelled")]
    Cancelled,
}

impl From<stratus_transfer::TransferError> for SyncError {
    fn from(e: stratus_transfer::TransferError) -> Self {
        match e {
            stratus_transfer::TransferError::Io(io) => SyncError::Io(io),
            stratus_transfer::TransferError::InvalidPath(p) => SyncError::Transfer {
                path: p,
                reason: "invalid path".into(),
            },
        }
    }
}

impl SyncError {
    /// True for errors that already carry phase context and must not be
    /// rewrapped by call sites.
    pub(crate) fn is_contextual(&self) -> bool {
        matches!(self, SyncError::Timeout { .. } | SyncError::Cancelled)
    }
}
