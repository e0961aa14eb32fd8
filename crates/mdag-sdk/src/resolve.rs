//! Path resolution across node payloads and links.
//!
//! A path is split on `/` (empty segments are ignored). Each segment is
//! looked up in the JSON view of the current position: an object field, or
//! a decimal index into an array. A segment that matches nothing there is
//! tried as a link name of the node being walked, in which case the linked
//! node is fetched and the walk continues from its JSON view.

use mdag_node::DagNode;
use mdag_store::BlockStore;
use mdag_types::Cid;
use serde_json::Value;
use tracing::debug;

use crate::error::{DagError, DagResult};

/// Resolve `path` starting at the node stored under `cid`.
pub fn resolve(store: &dyn BlockStore, cid: &Cid, path: &str) -> DagResult<Value> {
    let mut node_cid = *cid;
    let mut node = load(store, &node_cid)?;
    let mut current = node.to_value()?;

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if let Some(next) = step(&current, segment) {
            current = next;
            continue;
        }

        let Some(link) = node.get_link(segment) else {
            return Err(DagError::PathNotFound {
                cid: node_cid,
                segment: segment.to_string(),
                path: path.to_string(),
            });
        };
        debug!(from = %node_cid.short(), to = %link.cid.short(), segment, "resolve follows link");
        node_cid = link.cid;
        node = load(store, &node_cid)?;
        current = node.to_value()?;
    }
    Ok(current)
}

fn load(store: &dyn BlockStore, cid: &Cid) -> DagResult<DagNode> {
    store.try_get_node(cid)?.ok_or(DagError::NotFound(*cid))
}

fn step(value: &Value, segment: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(segment).cloned(),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .cloned(),
        _ => None,
    }
}
