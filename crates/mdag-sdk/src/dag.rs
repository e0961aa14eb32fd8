use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use mdag_hamt::{HamtConfig, HamtIndex, RootPointer, TrieStats};
use mdag_node::{
    DagLink, DagNode, Entity, Judgment, NodePayload, Pattern, RootPayload, TrieEntry, TrieSlot,
};
use mdag_store::{BlockStore, FsBlockStore, StoreStats};
use mdag_types::Cid;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DagConfig;
use crate::error::{DagError, DagResult};
use crate::proof::{InclusionProof, ProofBlock};
use crate::resolve;

/// Index of judgments by id.
pub const JUDGMENTS: &str = "judgments";
/// Index of entities by `(entity_type, identifier)`.
pub const ENTITIES: &str = "entities";
/// Index of patterns by id.
pub const PATTERNS: &str = "patterns";

const INDEX_NAMES: [&str; 3] = [JUDGMENTS, ENTITIES, PATTERNS];

/// Name of the facade root pointer under the refs directory.
const ROOT_REF: &str = "root";

/// Point-in-time counters for one index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub root_cid: Cid,
    pub entries: u64,
    pub trie_nodes: u64,
    pub max_depth: u64,
}

impl IndexStats {
    fn new(root_cid: Cid, trie: TrieStats) -> Self {
        Self {
            root_cid,
            entries: trie.entries,
            trie_nodes: trie.trie_nodes,
            max_depth: trie.max_depth,
        }
    }
}

/// Read-only snapshot of the whole DAG.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagStats {
    pub root_cid: Cid,
    pub store: StoreStats,
    pub indices: BTreeMap<String, IndexStats>,
}

/// High-level Merkle DAG API.
///
/// Records are stored as content-addressed nodes and registered in one of
/// the semantic indices. After every indexed write a new `ROOT` node linking
/// the current index roots is stored and the facade root pointer is advanced
/// to it by compare-and-swap.
pub struct MerkleDag {
    store: Arc<dyn BlockStore>,
    indices: BTreeMap<String, HamtIndex>,
    root: RootPointer,
    writer: Mutex<()>,
}

impl std::fmt::Debug for MerkleDag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerkleDag")
            .field("root", &self.root.current())
            .field("indices", &self.indices.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MerkleDag {
    /// Open (or create) a filesystem-backed DAG under `config.storage_root`.
    ///
    /// Blocks live in `<storage_root>/blocks`, root pointers in
    /// `<storage_root>/refs`.
    pub fn init(config: &DagConfig) -> DagResult<Self> {
        config.validate()?;
        let store: Arc<dyn BlockStore> = Arc::new(FsBlockStore::init(
            config.blocks_dir(),
            config.store.clone(),
        )?);
        let refs = config.refs_dir();
        let dag = Self::assemble(store, Some(refs.as_path()), config.hamt.clone())?;
        info!(
            storage_root = %config.storage_root.display(),
            root = %dag.root_cid().short(),
            "merkle dag opened"
        );
        Ok(dag)
    }

    /// A DAG over an existing store with root pointers held in memory.
    pub fn with_store(store: Arc<dyn BlockStore>, hamt: HamtConfig) -> DagResult<Self> {
        Self::assemble(store, None, hamt)
    }

    fn assemble(
        store: Arc<dyn BlockStore>,
        refs: Option<&Path>,
        hamt: HamtConfig,
    ) -> DagResult<Self> {
        let mut indices = BTreeMap::new();
        for name in INDEX_NAMES {
            let index = HamtIndex::init(store.clone(), refs, name, hamt.clone())?;
            indices.insert(name.to_string(), index);
        }

        let derived = store.put_node(&root_node(&indices))?;
        let root = match refs {
            Some(dir) => RootPointer::open(dir.join(ROOT_REF), || Ok(derived))?,
            None => RootPointer::in_memory(derived),
        };

        // The root pointer is written after the index pointers, so a crash in
        // between leaves it one step behind.
        let current = root.current();
        if current != derived {
            warn!(
                stored = %current.short(),
                derived = %derived.short(),
                "root pointer behind index roots; advancing"
            );
            root.compare_and_swap(&current, derived)?;
        }

        Ok(Self {
            store,
            indices,
            root,
            writer: Mutex::new(()),
        })
    }

    // ---- Accessors ----

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// CID of the current `ROOT` node. Never empty.
    pub fn root_cid(&self) -> Cid {
        self.root.current()
    }

    /// Current root of the named index.
    pub fn index_root(&self, name: &str) -> DagResult<Cid> {
        Ok(self.index(name)?.root_cid())
    }

    /// Every `(key, cid)` entry of the named index, sorted by key.
    pub fn index_entries(&self, name: &str) -> DagResult<Vec<TrieEntry>> {
        Ok(self.index(name)?.entries()?)
    }

    // Index handles stay private: their mutators bypass the writer lock and
    // the root pointer.
    fn index(&self, name: &str) -> DagResult<&HamtIndex> {
        self.indices
            .get(name)
            .ok_or_else(|| DagError::UnknownIndex(name.to_string()))
    }

    // ---- Node operations ----

    /// Store a node without indexing it. The root does not change.
    pub fn put(&self, node: &DagNode) -> DagResult<Cid> {
        Ok(self.store.put_node(node)?)
    }

    pub fn get(&self, cid: &Cid) -> DagResult<DagNode> {
        self.store.try_get_node(cid)?.ok_or(DagError::NotFound(*cid))
    }

    pub fn has(&self, cid: &Cid) -> DagResult<bool> {
        Ok(self.store.has(cid)?)
    }

    /// Resolve a `/`-separated path from the node at `cid`.
    pub fn resolve(&self, cid: &Cid, path: &str) -> DagResult<Value> {
        resolve::resolve(self.store.as_ref(), cid, path)
    }

    /// Every stored CID reachable from `cid`, `cid` included.
    ///
    /// Edges are node links plus the values of index trie entries, so the
    /// set reachable from [`root_cid`](Self::root_cid) is everything the
    /// current state depends on. Targets not in the store are skipped.
    pub fn reachable(&self, cid: &Cid) -> DagResult<BTreeSet<Cid>> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![*cid];
        while let Some(next) = stack.pop() {
            if seen.contains(&next) {
                continue;
            }
            let Some(node) = self.store.try_get_node(&next)? else {
                continue;
            };
            seen.insert(next);
            stack.extend(node.links.iter().map(|l| l.cid));
            if let Some(trie) = node.as_trie() {
                for slot in &trie.slots {
                    if let TrieSlot::Bucket(entries) = slot {
                        stack.extend(entries.iter().map(|e| e.cid));
                    }
                }
            }
        }
        Ok(seen)
    }

    // ---- Domain operations ----

    pub fn put_judgment(&self, judgment: &Judgment) -> DagResult<Cid> {
        self.put_indexed(JUDGMENTS, &judgment.id, &DagNode::judgment(judgment))
    }

    pub fn get_judgment(&self, id: &str) -> DagResult<Option<DagNode>> {
        self.get_indexed(JUDGMENTS, id)
    }

    pub fn put_entity(&self, entity: &Entity) -> DagResult<Cid> {
        let key = entity_key(&entity.entity_type, &entity.identifier);
        self.put_indexed(ENTITIES, &key, &DagNode::entity(entity))
    }

    pub fn get_entity(&self, entity_type: &str, identifier: &str) -> DagResult<Option<DagNode>> {
        self.get_indexed(ENTITIES, &entity_key(entity_type, identifier))
    }

    pub fn put_pattern(&self, pattern: &Pattern) -> DagResult<Cid> {
        self.put_indexed(PATTERNS, &pattern.id, &DagNode::pattern(pattern))
    }

    pub fn get_pattern(&self, id: &str) -> DagResult<Option<DagNode>> {
        self.get_indexed(PATTERNS, id)
    }

    /// Remove a judgment from its index. The record block stays in the
    /// store until the caller compacts it.
    pub fn delete_judgment(&self, id: &str) -> DagResult<bool> {
        self.delete_indexed(JUDGMENTS, id)
    }

    pub fn delete_entity(&self, entity_type: &str, identifier: &str) -> DagResult<bool> {
        self.delete_indexed(ENTITIES, &entity_key(entity_type, identifier))
    }

    pub fn delete_pattern(&self, id: &str) -> DagResult<bool> {
        self.delete_indexed(PATTERNS, id)
    }

    fn put_indexed(&self, index: &str, key: &str, node: &DagNode) -> DagResult<Cid> {
        let _writer = self.writer.lock().expect("lock poisoned");
        let index = self.index(index)?;
        let cid = self.store.put_node(node)?;
        index.set(key, cid)?;
        let root = self.advance_root()?;
        debug!(index = index.name(), key, cid = %cid.short(), root = %root.short(), "record indexed");
        Ok(cid)
    }

    fn delete_indexed(&self, index: &str, key: &str) -> DagResult<bool> {
        let _writer = self.writer.lock().expect("lock poisoned");
        let index = self.index(index)?;
        if !index.delete(key)? {
            return Ok(false);
        }
        let root = self.advance_root()?;
        debug!(index = index.name(), key, root = %root.short(), "record unindexed");
        Ok(true)
    }

    fn get_indexed(&self, index: &str, key: &str) -> DagResult<Option<DagNode>> {
        match self.index(index)?.get(key)? {
            Some(cid) => self.get(&cid).map(Some),
            None => Ok(None),
        }
    }

    /// Store a `ROOT` node for the current index roots and move the root
    /// pointer to it. Callers hold the writer lock.
    fn advance_root(&self) -> DagResult<Cid> {
        let base = self.root.current();
        let next = self.store.put_node(&root_node(&self.indices))?;
        self.root.compare_and_swap(&base, next)?;
        Ok(next)
    }

    // ---- Observability ----

    /// Snapshot of the state named by [`root_cid`](Self::root_cid).
    ///
    /// Index roots are read from the `ROOT` node rather than the live index
    /// pointers, so a concurrent write cannot pair one version's root with
    /// another version's indices.
    pub fn stats(&self) -> DagResult<DagStats> {
        let root_cid = self.root_cid();
        let root = self.get(&root_cid)?;
        let mut indices = BTreeMap::new();
        for (name, index) in &self.indices {
            let index_root = linked_index_root(&root_cid, &root, name)?;
            let trie = index.hamt().stats(&index_root)?;
            indices.insert(name.clone(), IndexStats::new(index_root, trie));
        }
        Ok(DagStats {
            root_cid,
            store: self.store.stats()?,
            indices,
        })
    }

    // ---- Proofs ----

    /// Proof that `key` is registered in `index` under the current root.
    ///
    /// Returns `Ok(None)` if the key is absent.
    pub fn prove(&self, index: &str, key: &str) -> DagResult<Option<InclusionProof>> {
        let hamt = self.index(index)?.hamt();
        let root = self.root_cid();
        let index_root = linked_index_root(&root, &self.get(&root)?, index)?;

        let (Some(levels), Some(target)) =
            (hamt.path(&index_root, key)?, hamt.get(&index_root, key)?)
        else {
            return Ok(None);
        };

        let mut blocks = Vec::with_capacity(levels.len() + 2);
        for cid in std::iter::once(root).chain(levels).chain(std::iter::once(target)) {
            let bytes = self.store.read_block(&cid)?.ok_or(DagError::NotFound(cid))?;
            blocks.push(ProofBlock { cid, bytes });
        }

        Ok(Some(InclusionProof {
            root,
            index: index.to_string(),
            key: key.to_string(),
            target,
            blocks,
        }))
    }

    pub fn prove_judgment(&self, id: &str) -> DagResult<Option<InclusionProof>> {
        self.prove(JUDGMENTS, id)
    }
}

/// Length-prefixed so that no two `(type, identifier)` pairs share a key.
fn entity_key(entity_type: &str, identifier: &str) -> String {
    format!("{}:{}:{}", entity_type.len(), entity_type, identifier)
}

fn linked_index_root(root_cid: &Cid, root: &DagNode, name: &str) -> DagResult<Cid> {
    root.get_link(name)
        .map(|l| l.cid)
        .ok_or_else(|| DagError::PathNotFound {
            cid: *root_cid,
            segment: name.to_string(),
            path: name.to_string(),
        })
}

fn root_node(indices: &BTreeMap<String, HamtIndex>) -> DagNode {
    let links = indices
        .iter()
        .map(|(name, index)| DagLink::new(name.clone(), index.root_cid()))
        .collect();
    DagNode::with_links(NodePayload::Root(RootPayload::default()), links)
}
