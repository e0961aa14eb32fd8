//! High-level API for the Merkle DAG store.
//!
//! [`MerkleDag`] is the main entry point for applications embedding the
//! store. It combines the content-addressed block store with three HAMT
//! indices (`judgments`, `entities`, `patterns`) and tracks a single root
//! CID naming the current state of all of them. That root is the value to
//! hand to an external anchoring service.

pub mod config;
pub mod dag;
pub mod error;
pub mod proof;
pub mod resolve;

pub use config::{DagConfig, STORAGE_ROOT_ENV};
pub use dag::{DagStats, IndexStats, MerkleDag, ENTITIES, JUDGMENTS, PATTERNS};
pub use error::{DagError, DagResult};
pub use proof::{InclusionProof, ProofBlock};

// Re-export key types
pub use mdag_hamt::HamtConfig;
pub use mdag_node::{
    DagLink, DagNode, Entity, Judgment, NodeKind, NodePayload, Pattern, TrieEntry, Verdict,
};
pub use mdag_store::{BlockStore, StoreConfig, StoreStats, SyncMode};
pub use mdag_types::{create_cid, is_valid_cid, parse_cid, shard_cid, Cid};
