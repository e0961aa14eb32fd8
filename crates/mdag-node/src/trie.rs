//! Payload shape of a HAMT trie level.
//!
//! The trie logic lives in `mdag-hamt`; this module only defines the stored
//! form so that trie levels are ordinary DAG nodes.

use mdag_types::Cid;
use serde::{Deserialize, Serialize};

/// A single `key -> cid` mapping held in a bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrieEntry {
    pub key: String,
    pub cid: Cid,
}

impl TrieEntry {
    pub fn new(key: impl Into<String>, cid: Cid) -> Self {
        Self {
            key: key.into(),
            cid,
        }
    }
}

/// One occupied position of a trie level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrieSlot {
    /// Entries stored inline, sorted by key.
    Bucket(Vec<TrieEntry>),
    /// A deeper trie level.
    Child(Cid),
}

/// A sparse trie level: bit `i` of `bitmap` is set when index `i` is
/// occupied, and `slots` holds one slot per set bit in index order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrieNode {
    pub bitmap: u32,
    pub slots: Vec<TrieSlot>,
}

impl TrieNode {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap == 0
    }

    /// Returns `true` if index `idx` is occupied.
    pub fn has_index(&self, idx: usize) -> bool {
        self.bitmap & (1u32 << idx) != 0
    }

    /// Position in `slots` of index `idx` (occupied or not).
    pub fn position(&self, idx: usize) -> usize {
        let below = if idx == 0 { 0 } else { self.bitmap & (u32::MAX >> (32 - idx)) };
        below.count_ones() as usize
    }

    /// Slot for index `idx`, if occupied.
    pub fn slot(&self, idx: usize) -> Option<&TrieSlot> {
        if self.has_index(idx) {
            self.slots.get(self.position(idx))
        } else {
            None
        }
    }

    /// Occupy index `idx` with `slot`. The index must be free.
    pub fn insert_slot(&mut self, idx: usize, slot: TrieSlot) {
        let pos = self.position(idx);
        self.bitmap |= 1u32 << idx;
        self.slots.insert(pos, slot);
    }

    /// Replace the slot at occupied index `idx`.
    pub fn replace_slot(&mut self, idx: usize, slot: TrieSlot) {
        let pos = self.position(idx);
        self.slots[pos] = slot;
    }

    /// Free index `idx`, returning its slot.
    pub fn remove_slot(&mut self, idx: usize) -> TrieSlot {
        let pos = self.position(idx);
        self.bitmap &= !(1u32 << idx);
        self.slots.remove(pos)
    }

    /// Occupied indices paired with their slots.
    pub fn indexed_slots(&self) -> impl Iterator<Item = (usize, &TrieSlot)> + '_ {
        (0..32usize)
            .filter(move |idx| self.has_index(*idx))
            .zip(self.slots.iter())
    }

    /// CIDs of child levels, in index order.
    pub fn child_cids(&self) -> Vec<(usize, Cid)> {
        self.indexed_slots()
            .filter_map(|(idx, slot)| match slot {
                TrieSlot::Child(cid) => Some((idx, *cid)),
                TrieSlot::Bucket(_) => None,
            })
            .collect()
    }

    pub fn has_children(&self) -> bool {
        self.slots.iter().any(|s| matches!(s, TrieSlot::Child(_)))
    }

    /// Number of entries held inline in buckets at this level.
    pub fn bucket_entry_count(&self) -> usize {
        self.slots
            .iter()
            .map(|s| match s {
                TrieSlot::Bucket(entries) => entries.len(),
                TrieSlot::Child(_) => 0,
            })
            .sum()
    }

    /// Returns `true` if the bitmap and slot list agree.
    pub fn is_consistent(&self) -> bool {
        self.bitmap.count_ones() as usize == self.slots.len()
            && self.slots.iter().all(|s| match s {
                TrieSlot::Bucket(entries) => {
                    !entries.is_empty() && entries.windows(2).all(|w| w[0].key < w[1].key)
                }
                TrieSlot::Child(_) => true,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdag_types::create_cid;

    fn bucket(key: &str) -> TrieSlot {
        TrieSlot::Bucket(vec![TrieEntry::new(key, create_cid(key.as_bytes()))])
    }

    #[test]
    fn position_counts_lower_bits() {
        let mut node = TrieNode::empty();
        node.insert_slot(7, bucket("a"));
        node.insert_slot(2, bucket("b"));
        node.insert_slot(31, bucket("c"));
        assert_eq!(node.position(2), 0);
        assert_eq!(node.position(7), 1);
        assert_eq!(node.position(31), 2);
        assert_eq!(node.position(0), 0);
        assert!(node.is_consistent());
    }

    #[test]
    fn slot_lookup_and_removal() {
        let mut node = TrieNode::empty();
        node.insert_slot(5, bucket("a"));
        node.insert_slot(9, TrieSlot::Child(create_cid(b"child")));
        assert!(node.slot(4).is_none());
        assert!(matches!(node.slot(9), Some(TrieSlot::Child(_))));
        assert!(node.has_children());
        assert_eq!(node.child_cids(), vec![(9, create_cid(b"child"))]);

        let removed = node.remove_slot(5);
        assert_eq!(removed, bucket("a"));
        assert!(!node.has_index(5));
        assert_eq!(node.slots.len(), 1);
        assert_eq!(node.bucket_entry_count(), 0);
    }

    #[test]
    fn inconsistent_bitmap_detected() {
        let node = TrieNode {
            bitmap: 0b11,
            slots: vec![bucket("a")],
        };
        assert!(!node.is_consistent());
    }

    #[test]
    fn unsorted_bucket_detected() {
        let mut node = TrieNode::empty();
        node.insert_slot(
            0,
            TrieSlot::Bucket(vec![
                TrieEntry::new("b", create_cid(b"b")),
                TrieEntry::new("a", create_cid(b"a")),
            ]),
        );
        assert!(!node.is_consistent());
    }

    #[test]
    fn serde_shape() {
        let mut node = TrieNode::empty();
        node.insert_slot(1, bucket("k"));
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(v["bitmap"], 2);
        assert!(v["slots"][0]["bucket"].is_array());
    }
}
