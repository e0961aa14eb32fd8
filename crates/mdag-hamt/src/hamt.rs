//! Persistent HAMT operations over an explicit root CID.
//!
//! # Shape
//!
//! A key's hash is consumed `bit_width` bits at a time, most significant bit
//! first; the bits for depth `d` select one of `2^bit_width` slots at that
//! level. A slot is either a bucket of up to `bucket_size` entries sorted by
//! key, or a link to a deeper level.
//!
//! # Canonical form
//!
//! - Inserting into a full bucket moves its entries into a new child level,
//!   unless the hash has no bits left, in which case the bucket simply grows.
//! - Deleting from a child that is left holding only buckets with at most
//!   `bucket_size` entries in total folds it back into a bucket.
//!
//! Together these make the root CID a function of the key set alone.

use std::sync::Arc;

use mdag_node::{DagLink, DagNode, NodePayload, TrieEntry, TrieNode, TrieSlot};
use mdag_store::BlockStore;
use mdag_types::Cid;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HamtConfig;
use crate::error::{HamtError, HamtResult};
use crate::hasher::{Blake3KeyHasher, KeyHasher};

/// Shape counters for one index version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrieStats {
    pub entries: u64,
    pub trie_nodes: u64,
    /// Depth of the deepest level (the root level is depth 0).
    pub max_depth: u64,
}

/// Persistent HAMT over a block store.
///
/// `Hamt` holds no root of its own: every operation takes the root to read
/// from and mutating operations return the root of the new version.
pub struct Hamt {
    store: Arc<dyn BlockStore>,
    config: HamtConfig,
    hasher: Arc<dyn KeyHasher>,
}

impl std::fmt::Debug for Hamt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hamt").field("config", &self.config).finish()
    }
}

impl Hamt {
    /// Create a HAMT using the default BLAKE3 key hasher.
    pub fn new(store: Arc<dyn BlockStore>, config: HamtConfig) -> HamtResult<Self> {
        Self::with_hasher(store, config, Arc::new(Blake3KeyHasher))
    }

    pub fn with_hasher(
        store: Arc<dyn BlockStore>,
        config: HamtConfig,
        hasher: Arc<dyn KeyHasher>,
    ) -> HamtResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            hasher,
        })
    }

    pub fn config(&self) -> &HamtConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// Store an empty root level and return its CID.
    pub fn empty_root(&self) -> HamtResult<Cid> {
        self.store_level(TrieNode::empty())
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Look up `key`. Returns `Ok(None)` when the key is absent.
    pub fn get(&self, root: &Cid, key: &str) -> HamtResult<Option<Cid>> {
        Ok(self.locate(root, key)?.map(|(_, cid)| cid))
    }

    /// CIDs of the levels visited from `root` down to the one holding `key`,
    /// or `None` if the key is absent.
    pub fn path(&self, root: &Cid, key: &str) -> HamtResult<Option<Vec<Cid>>> {
        Ok(self.locate(root, key)?.map(|(path, _)| path))
    }

    fn locate(&self, root: &Cid, key: &str) -> HamtResult<Option<(Vec<Cid>, Cid)>> {
        let hash = self.hasher.hash_key(key.as_bytes());
        let mut path = vec![*root];
        let mut level = self.load(root)?;
        let mut depth = 0;

        loop {
            let Some(idx) = self.index(&hash, depth) else {
                return Ok(None);
            };
            match level.slot(idx) {
                None => return Ok(None),
                Some(TrieSlot::Bucket(entries)) => {
                    return Ok(find(entries, key).map(|e| (path, e.cid)));
                }
                Some(TrieSlot::Child(child)) => {
                    let child = *child;
                    level = self.load(&child)?;
                    path.push(child);
                    depth += 1;
                }
            }
        }
    }

    /// All entries reachable from `root`, sorted by key.
    pub fn entries(&self, root: &Cid) -> HamtResult<Vec<TrieEntry>> {
        let mut out = Vec::new();
        self.walk(root, 0, &mut |_, level: &TrieNode| {
            for slot in &level.slots {
                if let TrieSlot::Bucket(entries) = slot {
                    out.extend(entries.iter().cloned());
                }
            }
        })?;
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    /// Count entries, levels, and depth of the version at `root`.
    pub fn stats(&self, root: &Cid) -> HamtResult<TrieStats> {
        let mut stats = TrieStats::default();
        self.walk(root, 0, &mut |depth, level: &TrieNode| {
            stats.trie_nodes += 1;
            stats.entries += level.bucket_entry_count() as u64;
            stats.max_depth = stats.max_depth.max(depth as u64);
        })?;
        Ok(stats)
    }

    fn walk(
        &self,
        cid: &Cid,
        depth: usize,
        visit: &mut dyn FnMut(usize, &TrieNode),
    ) -> HamtResult<()> {
        let level = self.load(cid)?;
        visit(depth, &level);
        for (_, child) in level.child_cids() {
            self.walk(&child, depth + 1, visit)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Updates
    // ---------------------------------------------------------------

    /// Map `key` to `value`, returning the new root. Setting a key to the
    /// value it already has returns `root` unchanged.
    pub fn set(&self, root: &Cid, key: &str, value: Cid) -> HamtResult<Cid> {
        let hash = self.hasher.hash_key(key.as_bytes());
        let level = self.load(root)?;
        let (level, changed) = self.set_in(level, &hash, 0, key, value)?;
        if !changed {
            return Ok(*root);
        }
        let new_root = self.store_level(level)?;
        debug!(key, old = %root.short(), new = %new_root.short(), "hamt set");
        Ok(new_root)
    }

    /// Remove `key`, returning the new root and whether the key was present.
    pub fn delete(&self, root: &Cid, key: &str) -> HamtResult<(Cid, bool)> {
        let hash = self.hasher.hash_key(key.as_bytes());
        let level = self.load(root)?;
        match self.delete_in(level, &hash, 0, key)? {
            None => Ok((*root, false)),
            Some(level) => {
                let new_root = self.store_level(level)?;
                debug!(key, old = %root.short(), new = %new_root.short(), "hamt delete");
                Ok((new_root, true))
            }
        }
    }

    fn set_in(
        &self,
        mut level: TrieNode,
        hash: &[u8; 32],
        depth: usize,
        key: &str,
        value: Cid,
    ) -> HamtResult<(TrieNode, bool)> {
        let idx = self
            .index(hash, depth)
            .ok_or_else(|| HamtError::InvalidConfig(format!("no hash bits left at depth {depth}")))?;

        match level.slot(idx).cloned() {
            None => {
                level.insert_slot(idx, TrieSlot::Bucket(vec![TrieEntry::new(key, value)]));
            }
            Some(TrieSlot::Bucket(mut entries)) => {
                match entries.binary_search_by(|e| e.key.as_str().cmp(key)) {
                    Ok(pos) if entries[pos].cid == value => return Ok((level, false)),
                    Ok(pos) => entries[pos].cid = value,
                    Err(pos)
                        if entries.len() < self.config.bucket_size
                            || self.index(hash, depth + 1).is_none() =>
                    {
                        entries.insert(pos, TrieEntry::new(key, value));
                    }
                    Err(_) => {
                        entries.push(TrieEntry::new(key, value));
                        let child = self.split(entries, depth + 1)?;
                        level.replace_slot(idx, TrieSlot::Child(child));
                        return Ok((level, true));
                    }
                }
                level.replace_slot(idx, TrieSlot::Bucket(entries));
            }
            Some(TrieSlot::Child(cid)) => {
                let child = self.load(&cid)?;
                let (child, changed) = self.set_in(child, hash, depth + 1, key, value)?;
                if !changed {
                    return Ok((level, false));
                }
                let child = self.store_level(child)?;
                level.replace_slot(idx, TrieSlot::Child(child));
            }
        }
        Ok((level, true))
    }

    /// Build and store a level at `depth` holding `entries`.
    fn split(&self, entries: Vec<TrieEntry>, depth: usize) -> HamtResult<Cid> {
        let mut level = TrieNode::empty();
        for entry in entries {
            let hash = self.hasher.hash_key(entry.key.as_bytes());
            let (next, _) = self.set_in(level, &hash, depth, &entry.key, entry.cid)?;
            level = next;
        }
        self.store_level(level)
    }

    fn delete_in(
        &self,
        mut level: TrieNode,
        hash: &[u8; 32],
        depth: usize,
        key: &str,
    ) -> HamtResult<Option<TrieNode>> {
        let Some(idx) = self.index(hash, depth) else {
            return Ok(None);
        };

        match level.slot(idx).cloned() {
            None => return Ok(None),
            Some(TrieSlot::Bucket(mut entries)) => {
                let Ok(pos) = entries.binary_search_by(|e| e.key.as_str().cmp(key)) else {
                    return Ok(None);
                };
                entries.remove(pos);
                if entries.is_empty() {
                    level.remove_slot(idx);
                } else {
                    level.replace_slot(idx, TrieSlot::Bucket(entries));
                }
            }
            Some(TrieSlot::Child(cid)) => {
                let child = self.load(&cid)?;
                let Some(child) = self.delete_in(child, hash, depth + 1, key)? else {
                    return Ok(None);
                };
                if child.is_empty() {
                    level.remove_slot(idx);
                } else if !child.has_children()
                    && child.bucket_entry_count() <= self.config.bucket_size
                {
                    level.replace_slot(idx, TrieSlot::Bucket(collapse(child)));
                } else {
                    let child = self.store_level(child)?;
                    level.replace_slot(idx, TrieSlot::Child(child));
                }
            }
        }
        Ok(Some(level))
    }

    // ---------------------------------------------------------------
    // Levels
    // ---------------------------------------------------------------

    /// Slot index for `depth`, or `None` once the hash is exhausted.
    fn index(&self, hash: &[u8; 32], depth: usize) -> Option<usize> {
        let width = self.config.bit_width as usize;
        let start = depth * width;
        if start + width > 256 {
            return None;
        }
        let mut idx = 0usize;
        for bit in start..start + width {
            let b = (hash[bit / 8] >> (7 - bit % 8)) & 1;
            idx = (idx << 1) | b as usize;
        }
        Some(idx)
    }

    fn load(&self, cid: &Cid) -> HamtResult<TrieNode> {
        let node = self.store.get_node(cid)?;
        let NodePayload::Hamt(level) = node.payload else {
            return Err(HamtError::CorruptNode {
                cid: *cid,
                reason: format!("expected HAMT node, found {}", node.payload.kind()),
            });
        };
        let slots = 1u64 << self.config.bit_width;
        if !level.is_consistent() || u64::from(level.bitmap) >> slots != 0 {
            return Err(HamtError::CorruptNode {
                cid: *cid,
                reason: "bitmap does not match slots".to_string(),
            });
        }
        Ok(level)
    }

    fn store_level(&self, level: TrieNode) -> HamtResult<Cid> {
        let links = level
            .child_cids()
            .into_iter()
            .map(|(idx, cid)| DagLink::new(idx.to_string(), cid))
            .collect();
        let node = DagNode::with_links(NodePayload::Hamt(level), links);
        Ok(self.store.put_node(&node)?)
    }
}

fn find<'a>(entries: &'a [TrieEntry], key: &str) -> Option<&'a TrieEntry> {
    entries
        .binary_search_by(|e| e.key.as_str().cmp(key))
        .ok()
        .map(|pos| &entries[pos])
}

fn collapse(level: TrieNode) -> Vec<TrieEntry> {
    let mut entries: Vec<TrieEntry> = level
        .slots
        .into_iter()
        .flat_map(|slot| match slot {
            TrieSlot::Bucket(entries) => entries,
            TrieSlot::Child(_) => Vec::new(),
        })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdag_store::InMemoryBlockStore;
    use mdag_types::create_cid;

    fn value(i: usize) -> Cid {
        create_cid(format!("value-{i}").as_bytes())
    }

    fn memory_hamt(config: HamtConfig) -> (Arc<InMemoryBlockStore>, Hamt) {
        let store = Arc::new(InMemoryBlockStore::new());
        let hamt = Hamt::new(store.clone(), config).unwrap();
        (store, hamt)
    }

    /// Every key hashes to the same bits.
    struct ConstantHasher;

    impl KeyHasher for ConstantHasher {
        fn hash_key(&self, _key: &[u8]) -> [u8; 32] {
            [0xa5; 32]
        }
    }

    /// Keys collide on the first byte only.
    struct PrefixCollisionHasher;

    impl KeyHasher for PrefixCollisionHasher {
        fn hash_key(&self, key: &[u8]) -> [u8; 32] {
            let mut h = mdag_types::ContentHasher::HAMT_KEY.hash(key);
            h[0] = 0;
            h
        }
    }

    #[test]
    fn set_then_get() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let root = hamt.empty_root().unwrap();
        let root = hamt.set(&root, "k", value(1)).unwrap();
        assert_eq!(hamt.get(&root, "k").unwrap(), Some(value(1)));
        assert_eq!(hamt.get(&root, "missing").unwrap(), None);
    }

    #[test]
    fn overwrite_replaces_value() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let root = hamt.empty_root().unwrap();
        let r1 = hamt.set(&root, "k", value(1)).unwrap();
        let r2 = hamt.set(&r1, "k", value(2)).unwrap();
        assert_ne!(r1, r2);
        assert_eq!(hamt.get(&r2, "k").unwrap(), Some(value(2)));
        assert_eq!(hamt.get(&r1, "k").unwrap(), Some(value(1)));
    }

    #[test]
    fn setting_same_value_keeps_root() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let root = hamt.empty_root().unwrap();
        let r1 = hamt.set(&root, "k", value(1)).unwrap();
        assert_eq!(hamt.set(&r1, "k", value(1)).unwrap(), r1);
    }

    #[test]
    fn many_keys_are_retrievable() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let mut root = hamt.empty_root().unwrap();
        for i in 0..10_000 {
            root = hamt.set(&root, &format!("key-{i}"), value(i)).unwrap();
        }
        for i in 0..10_000 {
            assert_eq!(hamt.get(&root, &format!("key-{i}")).unwrap(), Some(value(i)));
        }
        let stats = hamt.stats(&root).unwrap();
        assert_eq!(stats.entries, 10_000);
        assert!(stats.trie_nodes > 1);
        assert!(stats.max_depth <= 4, "depth {} grew too far", stats.max_depth);
    }

    #[test]
    fn root_is_independent_of_insertion_order() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let empty = hamt.empty_root().unwrap();
        let mut forward = empty;
        for i in 0..300 {
            forward = hamt.set(&forward, &format!("k{i}"), value(i)).unwrap();
        }
        let mut backward = empty;
        for i in (0..300).rev() {
            backward = hamt.set(&backward, &format!("k{i}"), value(i)).unwrap();
        }
        assert_eq!(forward, backward);
    }

    #[test]
    fn delete_restores_previous_root() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let mut root = hamt.empty_root().unwrap();
        for i in 0..200 {
            root = hamt.set(&root, &format!("k{i}"), value(i)).unwrap();
        }
        let before = root;
        for i in 200..400 {
            root = hamt.set(&root, &format!("k{i}"), value(i)).unwrap();
        }
        for i in 200..400 {
            let (next, removed) = hamt.delete(&root, &format!("k{i}")).unwrap();
            assert!(removed);
            root = next;
        }
        assert_eq!(root, before);
    }

    #[test]
    fn delete_everything_yields_empty_root() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let empty = hamt.empty_root().unwrap();
        let mut root = empty;
        for i in 0..100 {
            root = hamt.set(&root, &format!("k{i}"), value(i)).unwrap();
        }
        for i in 0..100 {
            root = hamt.delete(&root, &format!("k{i}")).unwrap().0;
        }
        assert_eq!(root, empty);
    }

    #[test]
    fn delete_missing_is_noop() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let root = hamt.set(&hamt.empty_root().unwrap(), "a", value(1)).unwrap();
        let (after, removed) = hamt.delete(&root, "never-set").unwrap();
        assert!(!removed);
        assert_eq!(after, root);
    }

    #[test]
    fn full_hash_collisions_resolve_distinctly() {
        let store = Arc::new(InMemoryBlockStore::new());
        let config = HamtConfig {
            bit_width: 5,
            bucket_size: 2,
        };
        let hamt = Hamt::with_hasher(store, config, Arc::new(ConstantHasher)).unwrap();
        let mut root = hamt.empty_root().unwrap();
        for i in 0..6 {
            root = hamt.set(&root, &format!("c{i}"), value(i)).unwrap();
        }
        for i in 0..6 {
            assert_eq!(hamt.get(&root, &format!("c{i}")).unwrap(), Some(value(i)));
        }
        let stats = hamt.stats(&root).unwrap();
        assert_eq!(stats.entries, 6);
        assert_eq!(stats.max_depth as usize, hamt.config().max_depth() - 1);

        let (root, removed) = hamt.delete(&root, "c3").unwrap();
        assert!(removed);
        assert_eq!(hamt.get(&root, "c3").unwrap(), None);
        assert_eq!(hamt.get(&root, "c4").unwrap(), Some(value(4)));
    }

    #[test]
    fn collapsing_chain_after_collision_delete() {
        let store = Arc::new(InMemoryBlockStore::new());
        let config = HamtConfig {
            bit_width: 5,
            bucket_size: 2,
        };
        let hamt = Hamt::with_hasher(store, config, Arc::new(ConstantHasher)).unwrap();
        let empty = hamt.empty_root().unwrap();
        let r1 = hamt.set(&empty, "a", value(1)).unwrap();
        let r2 = hamt.set(&r1, "b", value(2)).unwrap();
        let r3 = hamt.set(&r2, "c", value(3)).unwrap();
        assert_eq!(hamt.stats(&r2).unwrap().trie_nodes, 1);
        assert!(hamt.stats(&r3).unwrap().trie_nodes > 1);
        assert_eq!(hamt.delete(&r3, "c").unwrap().0, r2);
    }

    #[test]
    fn untouched_subtrees_are_shared() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let mut root = hamt.empty_root().unwrap();
        for i in 0..500 {
            root = hamt.set(&root, &format!("k{i}"), value(i)).unwrap();
        }
        let children = |root: &Cid| -> Vec<Cid> {
            let level = hamt.load(root).unwrap();
            level.child_cids().into_iter().map(|(_, c)| c).collect()
        };
        let before = children(&root);
        let after_root = hamt.set(&root, "k0", value(9_999)).unwrap();
        let after = children(&after_root);

        let shared = before.iter().filter(|c| after.contains(c)).count();
        assert!(shared + 1 >= before.len(), "only the touched path may change");
        assert_eq!(hamt.get(&root, "k0").unwrap(), Some(value(0)));
    }

    #[test]
    fn path_ends_at_level_holding_key() {
        let store = Arc::new(InMemoryBlockStore::new());
        let hamt = Hamt::with_hasher(
            store,
            HamtConfig {
                bit_width: 5,
                bucket_size: 1,
            },
            Arc::new(PrefixCollisionHasher),
        )
        .unwrap();
        let mut root = hamt.empty_root().unwrap();
        for i in 0..10 {
            root = hamt.set(&root, &format!("p{i}"), value(i)).unwrap();
        }
        let path = hamt.path(&root, "p3").unwrap().unwrap();
        assert_eq!(path[0], root);
        assert!(path.len() >= 2);
        let last = hamt.load(path.last().unwrap()).unwrap();
        assert!(last.slots.iter().any(|s| matches!(
            s,
            TrieSlot::Bucket(entries) if entries.iter().any(|e| e.key == "p3")
        )));
        assert!(hamt.path(&root, "absent").unwrap().is_none());
    }

    #[test]
    fn trie_levels_link_their_children() {
        let (store, hamt) = memory_hamt(HamtConfig {
            bit_width: 2,
            bucket_size: 1,
        });
        let mut root = hamt.empty_root().unwrap();
        for i in 0..20 {
            root = hamt.set(&root, &format!("k{i}"), value(i)).unwrap();
        }
        let node = store.get_node(&root).unwrap();
        let trie = node.as_trie().unwrap();
        assert_eq!(node.links.len(), trie.child_cids().len());
        for (idx, cid) in trie.child_cids() {
            assert_eq!(node.get_link(&idx.to_string()).unwrap().cid, cid);
        }
    }

    #[test]
    fn entries_are_sorted() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let mut root = hamt.empty_root().unwrap();
        for key in ["delta", "alpha", "charlie", "bravo"] {
            root = hamt.set(&root, key, create_cid(key.as_bytes())).unwrap();
        }
        let keys: Vec<String> = hamt.entries(&root).unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["alpha", "bravo", "charlie", "delta"]);
    }

    #[test]
    fn non_trie_root_is_corrupt() {
        let (store, hamt) = memory_hamt(HamtConfig::default());
        let cid = store.put_node(&DagNode::raw(serde_json::json!({}))).unwrap();
        assert!(matches!(
            hamt.get(&cid, "k").unwrap_err(),
            HamtError::CorruptNode { .. }
        ));
    }

    #[test]
    fn missing_root_block_is_store_not_found() {
        let (_, hamt) = memory_hamt(HamtConfig::default());
        let err = hamt.get(&create_cid(b"nowhere"), "k").unwrap_err();
        assert!(matches!(err, HamtError::Store(ref e) if e.is_not_found()));
    }
}
