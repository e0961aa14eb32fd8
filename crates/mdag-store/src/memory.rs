use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use mdag_types::Cid;

use crate::error::StoreResult;
use crate::traits::{BlockStore, StoreStats};

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. All blocks are held in memory behind a
/// `RwLock` for safe concurrent access. Blocks are cloned on read/write.
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
}

impl InMemoryBlockStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().expect("lock poisoned").is_empty()
    }

    /// Overwrite a block's bytes without re-deriving its CID.
    ///
    /// Only useful for simulating on-disk damage in tests.
    #[doc(hidden)]
    pub fn corrupt(&self, cid: &Cid, bytes: Vec<u8>) {
        self.blocks
            .write()
            .expect("lock poisoned")
            .insert(*cid, bytes);
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn write_block(&self, bytes: &[u8]) -> StoreResult<Cid> {
        let cid = Cid::from_content(bytes);
        let mut map = self.blocks.write().expect("lock poisoned");
        map.entry(cid).or_insert_with(|| bytes.to_vec());
        Ok(cid)
    }

    fn read_block(&self, cid: &Cid) -> StoreResult<Option<Vec<u8>>> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.get(cid).cloned())
    }

    fn has(&self, cid: &Cid) -> StoreResult<bool> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.contains_key(cid))
    }

    fn delete(&self, cid: &Cid) -> StoreResult<bool> {
        let mut map = self.blocks.write().expect("lock poisoned");
        Ok(map.remove(cid).is_some())
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let map = self.blocks.read().expect("lock poisoned");
        let shards: BTreeSet<String> = map.keys().map(|cid| cid.shard().prefix).collect();
        Ok(StoreStats {
            total_blocks: map.len() as u64,
            total_bytes: map.values().map(|b| b.len() as u64).sum(),
            shard_count: shards.len() as u64,
        })
    }

    fn list(&self) -> StoreResult<Vec<Cid>> {
        let map = self.blocks.read().expect("lock poisoned");
        let mut cids: Vec<Cid> = map.keys().copied().collect();
        cids.sort();
        Ok(cids)
    }
}

impl std::fmt::Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockStore")
            .field("block_count", &self.len())
            .finish()
    }
}
