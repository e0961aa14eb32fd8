use mdag_node::NodeError;
use mdag_types::Cid;

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No block exists for the CID.
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// Stored bytes fail verification or do not decode to a node.
    #[error("corrupt block {cid}: {reason}")]
    CorruptBlock { cid: Cid, reason: String },

    /// A node could not be encoded for storage.
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` for the normal "absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
