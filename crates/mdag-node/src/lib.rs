//! DAG node model for the Merkle DAG store.
//!
//! A [`DagNode`] is the atomic unit of storage: a typed payload plus an
//! ordered list of named [`DagLink`]s to other nodes. Its identifier is the
//! CID of its canonical encoding, so any change to payload or links yields
//! a different node. Nodes are never updated in place.
//!
//! Payloads form a closed union ([`NodePayload`]): one shape per
//! [`NodeKind`]. Decoding checks the kind/payload pairing and rejects
//! anything that would not re-encode to the same bytes.

pub mod error;
pub mod node;
pub mod record;
pub mod trie;

pub use error::{NodeError, NodeResult};
pub use node::{DagLink, DagNode, NodeKind, NodePayload, RootPayload};
pub use record::{Entity, Judgment, Pattern, Verdict};
pub use trie::{TrieEntry, TrieNode, TrieSlot};
