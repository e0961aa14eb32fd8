use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A string could not be decoded into a well-formed CID.
    #[error("malformed CID {input:?}: {reason}")]
    MalformedCid { input: String, reason: String },
}

impl TypeError {
    pub(crate) fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::MalformedCid {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
