//! Content-addressed block storage for the Merkle DAG store.
//!
//! Every node (records, HAMT trie levels, the facade root) is stored as an
//! immutable block of canonical bytes keyed by its CID. On disk the CID's
//! text is split into a two-character shard directory and a leaf file name,
//! which bounds the number of entries in any one directory however large
//! the corpus grows.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlockStore`] trait:
//!
//! - [`FsBlockStore`] -- sharded directory tree, atomic temp-file writes
//! - [`InMemoryBlockStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written (content-addressing guarantees this).
//! 2. Content determines location: writing the same bytes twice is a no-op.
//! 3. A block is either fully written and valid, or absent.
//! 4. Concurrent reads are always safe.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use config::{StoreConfig, SyncMode};
pub use error::{StoreError, StoreResult};
pub use fs::FsBlockStore;
pub use memory::InMemoryBlockStore;
pub use traits::{BlockStore, StoreStats};
