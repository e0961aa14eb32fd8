//! Self-contained inclusion proofs.
//!
//! An [`InclusionProof`] carries the encoded blocks on the path from a facade
//! root to one indexed record:
//!
//! ```text
//! ROOT --(index name)--> HAMT level --(slot)--> ... --> HAMT level --(key)--> record
//! ```
//!
//! Verification needs no store. Every block is re-hashed against its CID and
//! every hop is checked against the parent's decoded links, so altering any
//! byte of any block, or splicing in a block from another version, fails.

use mdag_node::{DagNode, NodePayload, TrieSlot};
use mdag_types::Cid;
use serde::{Deserialize, Serialize};

/// One encoded block of a proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBlock {
    pub cid: Cid,
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
}

/// Proof that `key` maps to `target` in index `index` under facade root
/// `root`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub root: Cid,
    pub index: String,
    pub key: String,
    pub target: Cid,
    /// Facade root first, record last.
    pub blocks: Vec<ProofBlock>,
}

impl InclusionProof {
    /// Check every block hash and every parent-to-child reference.
    pub fn verify(&self) -> bool {
        let Some((first, rest)) = self.blocks.split_first() else {
            return false;
        };
        let Some((last, levels)) = rest.split_last() else {
            return false;
        };
        if first.cid != self.root || last.cid != self.target || levels.is_empty() {
            return false;
        }
        if !self.blocks.iter().all(|b| b.cid.matches(&b.bytes)) {
            return false;
        }

        let Some(root) = decode(first) else {
            return false;
        };
        if !matches!(root.payload, NodePayload::Root(_))
            || root.get_link(&self.index).map(|l| l.cid) != Some(levels[0].cid)
        {
            return false;
        }

        for (i, block) in levels.iter().enumerate() {
            let Some(node) = decode(block) else {
                return false;
            };
            let Some(trie) = node.as_trie() else {
                return false;
            };
            let holds = match levels.get(i + 1) {
                Some(next) => {
                    trie.child_cids().iter().any(|(_, cid)| *cid == next.cid)
                        && node.links.iter().any(|l| l.cid == next.cid)
                }
                None => trie.slots.iter().any(|slot| match slot {
                    TrieSlot::Bucket(entries) => entries
                        .iter()
                        .any(|e| e.key == self.key && e.cid == self.target),
                    TrieSlot::Child(_) => false,
                }),
            };
            if !holds {
                return false;
            }
        }

        decode(last).is_some()
    }

    /// The proven record.
    pub fn record(&self) -> Option<DagNode> {
        self.blocks.last().and_then(decode)
    }
}

fn decode(block: &ProofBlock) -> Option<DagNode> {
    DagNode::decode(&block.bytes).ok()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
