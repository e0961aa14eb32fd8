//! Foundation types for the Merkle DAG store.
//!
//! Every other `mdag` crate depends on `mdag-types`. It owns the content
//! identifier codec: how a byte payload becomes a stable, self-describing
//! name, how that name is parsed and validated, and how it is split into a
//! shard directory plus a leaf key for on-disk placement.
//!
//! # Key Types
//!
//! - [`Cid`] -- content identifier (version tag + BLAKE3 digest)
//! - [`ShardPath`] -- `(prefix, suffix)` split of a CID's text form
//! - [`ContentHasher`] -- domain-separated BLAKE3 hasher

pub mod cid;
pub mod error;
pub mod hasher;

pub use cid::{
    create_cid, is_valid_cid, parse_cid, shard_cid, Cid, CidVersion, ParsedCid, ShardPath,
    DIGEST_LEN, SHARD_PREFIX_LEN,
};
pub use error::TypeError;
pub use hasher::ContentHasher;
