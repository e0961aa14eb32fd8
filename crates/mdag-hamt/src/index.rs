use std::path::Path;
use std::sync::Arc;

use mdag_node::TrieEntry;
use mdag_store::BlockStore;
use mdag_types::Cid;
use tracing::{debug, info};

use crate::config::HamtConfig;
use crate::error::{HamtError, HamtResult};
use crate::hamt::{Hamt, TrieStats};
use crate::root::RootPointer;

/// A named, mutable index: a [`Hamt`] plus the [`RootPointer`] naming its
/// current version.
#[derive(Debug)]
pub struct HamtIndex {
    name: String,
    hamt: Hamt,
    root: RootPointer,
}

impl HamtIndex {
    /// Establish or load the index called `name`.
    ///
    /// With `refs_dir` set, the root pointer is persisted to
    /// `<refs_dir>/<name>`; otherwise it lives in memory and a fresh index
    /// starts empty.
    pub fn init(
        store: Arc<dyn BlockStore>,
        refs_dir: Option<&Path>,
        name: &str,
        config: HamtConfig,
    ) -> HamtResult<Self> {
        validate_name(name)?;
        let hamt = Hamt::new(store, config)?;
        let root = match refs_dir {
            Some(dir) => RootPointer::open(dir.join(name), || hamt.empty_root())?,
            None => RootPointer::in_memory(hamt.empty_root()?),
        };

        let current = root.current();
        if !hamt.store().has(&current)? {
            return Err(HamtError::MissingRoot {
                name: name.to_string(),
                cid: current,
            });
        }
        info!(index = name, root = %current.short(), "index loaded");

        Ok(Self::from_parts(name, hamt, root))
    }

    /// Assemble an index from an existing trie and pointer.
    pub fn from_parts(name: impl Into<String>, hamt: Hamt, root: RootPointer) -> Self {
        Self {
            name: name.into(),
            hamt,
            root,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_cid(&self) -> Cid {
        self.root.current()
    }

    pub fn hamt(&self) -> &Hamt {
        &self.hamt
    }

    /// Map `key` to `value` and advance the root. Returns the new root.
    pub fn set(&self, key: &str, value: Cid) -> HamtResult<Cid> {
        let base = self.root.current();
        let next = self.hamt.set(&base, key, value)?;
        self.root.compare_and_swap(&base, next)?;
        debug!(index = %self.name, key, root = %next.short(), "index set");
        Ok(next)
    }

    pub fn get(&self, key: &str) -> HamtResult<Option<Cid>> {
        self.hamt.get(&self.root.current(), key)
    }

    pub fn has(&self, key: &str) -> HamtResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> HamtResult<bool> {
        let base = self.root.current();
        let (next, removed) = self.hamt.delete(&base, key)?;
        if removed {
            self.root.compare_and_swap(&base, next)?;
            debug!(index = %self.name, key, root = %next.short(), "index delete");
        }
        Ok(removed)
    }

    pub fn entries(&self) -> HamtResult<Vec<TrieEntry>> {
        self.hamt.entries(&self.root.current())
    }

    pub fn stats(&self) -> HamtResult<TrieStats> {
        self.hamt.stats(&self.root.current())
    }

    /// Trie levels from the current root down to the level holding `key`.
    pub fn path(&self, key: &str) -> HamtResult<Option<Vec<Cid>>> {
        self.hamt.path(&self.root.current(), key)
    }
}

/// Index names become file names under the refs directory.
fn validate_name(name: &str) -> HamtResult<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.starts_with('.') {
        "must not start with '.'"
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        "only ASCII letters, digits, '-' and '_' are allowed"
    } else {
        return Ok(());
    };
    Err(HamtError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}
