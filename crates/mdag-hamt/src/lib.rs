//! Persistent hash-array-mapped trie (HAMT) index.
//!
//! Maps semantic keys to CIDs. Every trie level is an ordinary `HAMT` DAG
//! node in the block store, so an index version is identified by the CID of
//! its root level. Updating a key rewrites only the levels on the path from
//! the affected bucket to the root; every other level is shared with the
//! previous version.
//!
//! - [`Hamt`] -- pure operations over an explicit root CID
//! - [`RootPointer`] -- the current root, advanced by compare-and-swap
//! - [`HamtIndex`] -- a named `Hamt` plus its `RootPointer`

pub mod config;
pub mod error;
pub mod hamt;
pub mod hasher;
pub mod index;
pub mod root;

pub use config::HamtConfig;
pub use error::{HamtError, HamtResult};
pub use hamt::{Hamt, TrieStats};
pub use hasher::{Blake3KeyHasher, KeyHasher};
pub use index::HamtIndex;
pub use root::RootPointer;
