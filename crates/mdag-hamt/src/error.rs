//! Error types for HAMT operations.

use mdag_store::StoreError;
use mdag_types::{Cid, TypeError};

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum HamtError {
    /// Block store failure (including corrupt blocks).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A block decoded, but is not a well-formed trie level.
    #[error("corrupt trie node {cid}: {reason}")]
    CorruptNode { cid: Cid, reason: String },

    /// The root moved between reading it and committing a new one.
    #[error("root conflict: expected {expected}, found {actual}")]
    RootConflict { expected: Cid, actual: Cid },

    /// A persisted root pointer names a block that is not in the store.
    #[error("index {name}: root block {cid} is missing")]
    MissingRoot { name: String, cid: Cid },

    /// An index name cannot be used as a root pointer file name.
    #[error("invalid index name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The configuration is out of range.
    #[error("invalid HAMT config: {0}")]
    InvalidConfig(String),

    /// A persisted root pointer does not hold a valid CID.
    #[error("invalid root pointer: {0}")]
    Type(#[from] TypeError),

    /// I/O error while persisting a root pointer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for HAMT results.
pub type HamtResult<T> = Result<T, HamtError>;
