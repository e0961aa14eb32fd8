use mdag_node::DagNode;
use mdag_types::Cid;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Aggregate block counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_blocks: u64,
    pub total_bytes: u64,
    /// Number of shards holding at least one block.
    pub shard_count: u64,
}

/// Content-addressed block store.
///
/// All implementations must satisfy these invariants:
/// - The CID of a block is computed from its bytes, never supplied.
/// - Writing existing content is a no-op.
/// - Concurrent reads are always safe (blocks are immutable).
/// - All I/O errors are propagated, never silently ignored.
pub trait BlockStore: Send + Sync {
    /// Write a block and return its CID.
    fn write_block(&self, bytes: &[u8]) -> StoreResult<Cid>;

    /// Read a block's bytes.
    ///
    /// Returns `Ok(None)` if the block does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn read_block(&self, cid: &Cid) -> StoreResult<Option<Vec<u8>>>;

    /// Check whether a block exists without reading it.
    fn has(&self, cid: &Cid) -> StoreResult<bool>;

    /// Delete a block. Returns `true` if the block existed.
    ///
    /// Deleting a block that is still linked from elsewhere leaves a
    /// dangling reference; compaction policy is the caller's.
    fn delete(&self, cid: &Cid) -> StoreResult<bool>;

    /// Aggregate counters over every block currently stored.
    fn stats(&self) -> StoreResult<StoreStats>;

    /// CIDs of every block currently stored, sorted.
    fn list(&self) -> StoreResult<Vec<Cid>>;

    /// Encode and store a node, returning its CID.
    fn put_node(&self, node: &DagNode) -> StoreResult<Cid> {
        let bytes = node.encode()?;
        self.write_block(&bytes)
    }

    /// Read and decode a node. Fails with [`StoreError::NotFound`] if absent.
    fn get_node(&self, cid: &Cid) -> StoreResult<DagNode> {
        self.try_get_node(cid)?.ok_or(StoreError::NotFound(*cid))
    }

    /// Read and decode a node, returning `Ok(None)` if absent.
    fn try_get_node(&self, cid: &Cid) -> StoreResult<Option<DagNode>> {
        let Some(bytes) = self.read_block(cid)? else {
            return Ok(None);
        };
        DagNode::decode(&bytes)
            .map(Some)
            .map_err(|e| StoreError::CorruptBlock {
                cid: *cid,
                reason: e.to_string(),
            })
    }
}
