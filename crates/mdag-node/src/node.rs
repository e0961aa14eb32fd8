//! The [`DagNode`] type and its canonical encoding.
//!
//! # Wire format
//!
//! A node encodes to compact JSON with exactly three fields, in this order:
//!
//! ```text
//! {"kind":"JUDGMENT","data":{...},"links":[{"name":"...","cid":"f..."}]}
//! ```
//!
//! Object keys inside `data` are sorted, so the encoding depends only on the
//! logical content. Decoding rejects bytes that would not re-encode to the
//! exact same sequence; a block either round-trips or is corrupt.

use mdag_types::Cid;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NodeError, NodeResult};
use crate::record::{Entity, Judgment, Pattern};
use crate::trie::TrieNode;

/// Discriminant of a node's payload shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Judgment,
    Entity,
    Pattern,
    Hamt,
    Root,
    Raw,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Judgment => write!(f, "JUDGMENT"),
            Self::Entity => write!(f, "ENTITY"),
            Self::Pattern => write!(f, "PATTERN"),
            Self::Hamt => write!(f, "HAMT"),
            Self::Root => write!(f, "ROOT"),
            Self::Raw => write!(f, "RAW"),
        }
    }
}

/// Payload of the facade's root node. The index roots are carried as links.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootPayload {
    pub schema: u32,
}

impl Default for RootPayload {
    fn default() -> Self {
        Self { schema: 1 }
    }
}

/// Typed node payload, one variant per [`NodeKind`].
#[derive(Clone, Debug, PartialEq)]
pub enum NodePayload {
    Judgment(Judgment),
    Entity(Entity),
    Pattern(Pattern),
    Hamt(TrieNode),
    Root(RootPayload),
    /// Arbitrary structured data.
    Raw(Value),
}

impl NodePayload {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Judgment(_) => NodeKind::Judgment,
            Self::Entity(_) => NodeKind::Entity,
            Self::Pattern(_) => NodeKind::Pattern,
            Self::Hamt(_) => NodeKind::Hamt,
            Self::Root(_) => NodeKind::Root,
            Self::Raw(_) => NodeKind::Raw,
        }
    }

    fn to_data(&self) -> NodeResult<Value> {
        let data = match self {
            Self::Judgment(j) => {
                j.check_finite()?;
                serde_json::to_value(j)
            }
            Self::Entity(e) => serde_json::to_value(e),
            Self::Pattern(p) => {
                p.check_finite()?;
                serde_json::to_value(p)
            }
            Self::Hamt(t) => serde_json::to_value(t),
            Self::Root(r) => serde_json::to_value(r),
            Self::Raw(v) => return Ok(v.clone()),
        };
        data.map_err(|e| NodeError::NonCanonical(e.to_string()))
    }

    fn from_data(kind: NodeKind, data: Value) -> NodeResult<Self> {
        fn parse<T: serde::de::DeserializeOwned>(kind: NodeKind, data: Value) -> NodeResult<T> {
            serde_json::from_value(data)
                .map_err(|e| NodeError::CorruptBlock(format!("invalid {kind} payload: {e}")))
        }

        Ok(match kind {
            NodeKind::Judgment => Self::Judgment(parse(kind, data)?),
            NodeKind::Entity => Self::Entity(parse(kind, data)?),
            NodeKind::Pattern => Self::Pattern(parse(kind, data)?),
            NodeKind::Hamt => Self::Hamt(parse(kind, data)?),
            NodeKind::Root => Self::Root(parse(kind, data)?),
            NodeKind::Raw => Self::Raw(data),
        })
    }
}

/// A named, directed edge to another node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DagLink {
    pub name: String,
    pub cid: Cid,
}

impl DagLink {
    pub fn new(name: impl Into<String>, cid: Cid) -> Self {
        Self {
            name: name.into(),
            cid,
        }
    }
}

/// The atomic unit of storage: a typed payload plus named links.
///
/// A node's identity is the CID of its canonical encoding; nodes are never
/// mutated after they are stored. Link names are unique within a node.
#[derive(Clone, Debug, PartialEq)]
pub struct DagNode {
    pub payload: NodePayload,
    pub links: Vec<DagLink>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireNode {
    kind: NodeKind,
    data: Value,
    links: Vec<DagLink>,
}

impl DagNode {
    /// Create a node with no links.
    pub fn new(payload: NodePayload) -> Self {
        Self {
            payload,
            links: Vec::new(),
        }
    }

    /// Create a node with the given links.
    pub fn with_links(payload: NodePayload, links: Vec<DagLink>) -> Self {
        let mut node = Self::new(payload);
        for link in links {
            node.link(link.name, link.cid);
        }
        node
    }

    /// A `JUDGMENT` node mirroring the judgment's fields.
    pub fn judgment(judgment: &Judgment) -> Self {
        Self::new(NodePayload::Judgment(judgment.clone()))
    }

    pub fn entity(entity: &Entity) -> Self {
        Self::new(NodePayload::Entity(entity.clone()))
    }

    pub fn pattern(pattern: &Pattern) -> Self {
        Self::new(NodePayload::Pattern(pattern.clone()))
    }

    pub fn raw(data: Value) -> Self {
        Self::new(NodePayload::Raw(data))
    }

    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    // ---------------------------------------------------------------
    // Links
    // ---------------------------------------------------------------

    /// Link `child` under `name` and return the child's CID.
    ///
    /// The child is not persisted; storing it is the caller's job.
    pub fn add_link(&mut self, child: &DagNode, name: impl Into<String>) -> NodeResult<Cid> {
        let cid = child.cid()?;
        self.link(name, cid);
        Ok(cid)
    }

    /// Link a target by CID. A link with the same name is retargeted in place.
    pub fn link(&mut self, name: impl Into<String>, cid: Cid) {
        let name = name.into();
        match self.links.iter().position(|l| l.name == name) {
            Some(pos) => self.links[pos].cid = cid,
            None => self.links.push(DagLink { name, cid }),
        }
    }

    pub fn get_link(&self, name: &str) -> Option<&DagLink> {
        self.links.iter().find(|l| l.name == name)
    }

    // ---------------------------------------------------------------
    // Encoding
    // ---------------------------------------------------------------

    /// Canonical encoding of `(kind, payload, links)`.
    pub fn encode(&self) -> NodeResult<Vec<u8>> {
        let wire = WireNode {
            kind: self.kind(),
            data: self.payload.to_data()?,
            links: self.links.clone(),
        };
        serde_json::to_vec(&wire).map_err(|e| NodeError::NonCanonical(e.to_string()))
    }

    /// Decode a node from its canonical encoding.
    pub fn decode(bytes: &[u8]) -> NodeResult<Self> {
        let wire: WireNode = serde_json::from_slice(bytes)
            .map_err(|e| NodeError::CorruptBlock(format!("undecodable node: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = wire.links.iter().find(|l| !seen.insert(l.name.as_str())) {
            return Err(NodeError::CorruptBlock(format!(
                "duplicate link name {:?}",
                dup.name
            )));
        }

        let node = Self {
            payload: NodePayload::from_data(wire.kind, wire.data)?,
            links: wire.links,
        };

        if node.encode()? != bytes {
            return Err(NodeError::CorruptBlock(
                "encoding is not canonical".to_string(),
            ));
        }
        Ok(node)
    }

    /// CID of the canonical encoding.
    pub fn cid(&self) -> NodeResult<Cid> {
        Ok(Cid::from_content(&self.encode()?))
    }

    /// JSON view `{"kind", "data", "links"}` used for path resolution.
    pub fn to_value(&self) -> NodeResult<Value> {
        let wire = WireNode {
            kind: self.kind(),
            data: self.payload.to_data()?,
            links: self.links.clone(),
        };
        serde_json::to_value(wire).map_err(|e| NodeError::NonCanonical(e.to_string()))
    }

    // ---------------------------------------------------------------
    // Typed access
    // ---------------------------------------------------------------

    pub fn as_judgment(&self) -> Option<&Judgment> {
        match &self.payload {
            NodePayload::Judgment(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match &self.payload {
            NodePayload::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_pattern(&self) -> Option<&Pattern> {
        match &self.payload {
            NodePayload::Pattern(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_trie(&self) -> Option<&TrieNode> {
        match &self.payload {
            NodePayload::Hamt(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Value> {
        match &self.payload {
            NodePayload::Raw(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Verdict;
    use crate::trie::{TrieEntry, TrieSlot};
    use chrono::TimeZone;
    use mdag_types::create_cid;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_judgment() -> Judgment {
        Judgment::new("jdg_1", 72.0, 0.58)
            .with_dimension("fidelity", 0.7)
            .with_dimension("phi", 0.61)
            .with_item_type("code")
            .with_content("fn main() {}")
            .with_timestamp(chrono::Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn judgment_node_roundtrip() {
        let node = DagNode::judgment(&sample_judgment());
        let bytes = node.encode().unwrap();
        let decoded = DagNode::decode(&bytes).unwrap();
        assert_eq!(decoded.kind(), NodeKind::Judgment);
        assert_eq!(decoded, node);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn every_kind_roundtrips() {
        let mut trie = TrieNode::empty();
        trie.insert_slot(3, TrieSlot::Bucket(vec![TrieEntry::new("k", create_cid(b"v"))]));
        let nodes = vec![
            DagNode::judgment(&sample_judgment()),
            DagNode::entity(&Entity::new("token", "X").with_name("Wrapped SOL")),
            DagNode::pattern(&Pattern::new("p", "loop", 0.3).with_data("n", json!([1, 2]))),
            DagNode::new(NodePayload::Hamt(trie)),
            DagNode::new(NodePayload::Root(RootPayload::default())),
            DagNode::raw(json!({"nested": {"value": 42}, "list": [1.5, "a", null]})),
        ];
        for node in nodes {
            let decoded = DagNode::decode(&node.encode().unwrap()).unwrap();
            assert_eq!(decoded, node, "{}", node.kind());
        }
    }

    #[test]
    fn encoding_is_canonical() {
        let a = DagNode::raw(json!({"b": 1, "a": 2}));
        let b = DagNode::raw(json!({"a": 2, "b": 1}));
        assert_eq!(a.encode().unwrap(), b.encode().unwrap());
        assert_eq!(a.cid().unwrap(), b.cid().unwrap());
        let text = String::from_utf8(a.encode().unwrap()).unwrap();
        assert_eq!(text, r#"{"kind":"RAW","data":{"a":2,"b":1},"links":[]}"#);
    }

    #[test]
    fn payload_change_changes_cid() {
        let a = DagNode::judgment(&Judgment::new("j", 50.0, 0.5));
        let b = DagNode::judgment(&Judgment::new("j", 50.5, 0.5));
        assert_ne!(a.cid().unwrap(), b.cid().unwrap());
    }

    #[test]
    fn link_change_changes_cid() {
        let mut a = DagNode::raw(json!({}));
        let before = a.cid().unwrap();
        a.link("x", create_cid(b"target"));
        assert_ne!(a.cid().unwrap(), before);
    }

    #[test]
    fn add_link_records_child_cid() {
        let child = DagNode::raw(json!({"leaf": true}));
        let mut parent = DagNode::raw(json!({"root": true}));
        let cid = parent.add_link(&child, "child").unwrap();

        let matching: Vec<_> = parent.links.iter().filter(|l| l.name == "child").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].cid, child.cid().unwrap());
        assert_eq!(cid, matching[0].cid);
    }

    #[test]
    fn relinking_a_name_retargets() {
        let mut node = DagNode::raw(json!(null));
        node.link("prev", create_cid(b"one"));
        node.link("prev", create_cid(b"two"));
        assert_eq!(node.links.len(), 1);
        assert_eq!(node.get_link("prev").unwrap().cid, create_cid(b"two"));
    }

    #[test]
    fn decode_rejects_garbage() {
        let cases: [&[u8]; 3] = [
            b"not json",
            b"{}",
            br#"{"kind":"NOPE","data":{},"links":[]}"#,
        ];
        for bad in cases {
            assert!(matches!(DagNode::decode(bad), Err(NodeError::CorruptBlock(_))));
        }
    }

    #[test]
    fn decode_rejects_kind_payload_mismatch() {
        let bytes = br#"{"kind":"JUDGMENT","data":{"nested":1},"links":[]}"#;
        assert!(matches!(DagNode::decode(bytes), Err(NodeError::CorruptBlock(_))));
    }

    #[test]
    fn decode_rejects_non_canonical_bytes() {
        let bytes = br#"{"kind":"RAW", "data":{"a":1},"links":[]}"#;
        assert!(matches!(DagNode::decode(bytes), Err(NodeError::CorruptBlock(_))));
        let reordered = br#"{"kind":"RAW","data":{"b":1,"a":2},"links":[]}"#;
        assert!(DagNode::decode(reordered).is_err());
    }

    #[test]
    fn decode_rejects_duplicate_link_names() {
        let cid = create_cid(b"t");
        let bytes = format!(
            r#"{{"kind":"RAW","data":null,"links":[{{"name":"a","cid":"{cid}"}},{{"name":"a","cid":"{cid}"}}]}}"#
        );
        assert!(DagNode::decode(bytes.as_bytes()).is_err());
    }

    #[test]
    fn non_finite_payload_cannot_encode() {
        let node = DagNode::judgment(&Judgment::new("bad", f64::NAN, 0.1));
        assert!(matches!(node.encode(), Err(NodeError::NonCanonical(_))));
    }

    #[test]
    fn value_view_exposes_data() {
        let node = DagNode::judgment(&Judgment::new("v", 72.0, 0.5).with_verdict(Verdict::Wag));
        let view = node.to_value().unwrap();
        assert_eq!(view["kind"], json!("JUDGMENT"));
        assert_eq!(view["data"]["qScore"], json!(72.0));
        assert_eq!(view["data"]["verdict"], json!("WAG"));
    }

    #[test]
    fn typed_accessors() {
        let node = DagNode::entity(&Entity::new("token", "X"));
        assert!(node.as_entity().is_some());
        assert!(node.as_judgment().is_none());
        assert!(node.as_trie().is_none());
    }

    #[test]
    fn full_precision_scores_decode() {
        let node = DagNode::judgment(&Judgment::new("jdg_q", 72.0, 0.20738662810683415));
        let bytes = node.encode().unwrap();
        let decoded = DagNode::decode(&bytes).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.as_judgment().unwrap().confidence, 0.20738662810683415);
    }

    fn finite() -> impl Strategy<Value = f64> {
        any::<f64>().prop_filter("finite", |v| v.is_finite())
    }

    fn assert_canonical(node: &DagNode) -> Result<(), TestCaseError> {
        let bytes = node.encode().unwrap();
        let decoded = DagNode::decode(&bytes)
            .map_err(|e| TestCaseError::fail(format!("decode failed: {e}")))?;
        prop_assert_eq!(&decoded, node);
        prop_assert_eq!(decoded.encode().unwrap(), bytes);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_judgment_scores_roundtrip(
            q in finite(),
            confidence in finite(),
            dimension in finite(),
        ) {
            let judgment = Judgment::new("jdg_prop", q, confidence).with_dimension("depth", dimension);
            assert_canonical(&DagNode::judgment(&judgment))?;
        }

        #[test]
        fn prop_unit_range_scores_roundtrip(q in 0.0f64..100.0) {
            assert_canonical(&DagNode::judgment(&Judgment::new("jdg_q", q, q / 100.0)))?;
        }

        #[test]
        fn prop_raw_numbers_roundtrip(x in finite(), n in any::<i64>(), items in proptest::collection::vec(finite(), 0..8)) {
            assert_canonical(&DagNode::raw(json!({"x": x, "n": n, "items": items})))?;
        }

        #[test]
        fn prop_pattern_confidence_roundtrip(confidence in finite(), weight in finite()) {
            let pattern = Pattern::new("pat_prop", "loop", confidence).with_data("weight", json!(weight));
            assert_canonical(&DagNode::pattern(&pattern))?;
        }
    }
}
