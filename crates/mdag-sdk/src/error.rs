use mdag_types::Cid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("node not found: {0}")]
    NotFound(Cid),

    #[error("path {path:?} not found at {cid}: no field or link {segment:?}")]
    PathNotFound {
        cid: Cid,
        segment: String,
        path: String,
    },

    #[error("unknown index: {0}")]
    UnknownIndex(String),

    #[error("store error: {0}")]
    Store(#[from] mdag_store::StoreError),

    #[error("index error: {0}")]
    Hamt(#[from] mdag_hamt::HamtError),

    #[error("node error: {0}")]
    Node(#[from] mdag_node::NodeError),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DagError {
    /// Returns `true` for the normal negative outcomes (absent node or path).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::PathNotFound { .. } => true,
            Self::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type DagResult<T> = Result<T, DagError>;
