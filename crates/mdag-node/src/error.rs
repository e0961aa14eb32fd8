//! Error types for node encoding and decoding.

/// Errors that can occur while encoding or decoding a node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The bytes do not decode to a well-formed node.
    #[error("corrupt block: {0}")]
    CorruptBlock(String),

    /// The node holds a value with no canonical encoding.
    #[error("non-canonical payload: {0}")]
    NonCanonical(String),
}

/// Convenience alias for node results.
pub type NodeResult<T> = Result<T, NodeError>;
