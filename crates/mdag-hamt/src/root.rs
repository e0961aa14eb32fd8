//! The mutable pointer to an index's current root.
//!
//! A [`RootPointer`] is the only mutable state of an index. It moves only by
//! compare-and-swap, so a writer that read a stale root cannot silently
//! discard another writer's update. A file-backed pointer is rewritten
//! through a temporary file in the same directory and renamed into place,
//! so readers see either the old or the new CID.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mdag_types::Cid;
use tracing::{debug, warn};

use crate::error::{HamtError, HamtResult};

/// Current root CID of one index, optionally persisted to a file.
#[derive(Debug)]
pub struct RootPointer {
    current: Mutex<Cid>,
    path: Option<PathBuf>,
}

impl RootPointer {
    /// A pointer that lives only as long as this value.
    pub fn in_memory(root: Cid) -> Self {
        Self {
            current: Mutex::new(root),
            path: None,
        }
    }

    /// Open the pointer persisted at `path`.
    ///
    /// If the file does not exist yet, `init` supplies the first root, which
    /// is written before returning.
    pub fn open(
        path: impl AsRef<Path>,
        init: impl FnOnce() -> HamtResult<Cid>,
    ) -> HamtResult<Self> {
        let path = path.as_ref().to_path_buf();
        let root = match fs::read_to_string(&path) {
            Ok(text) => Cid::parse(text.trim())?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let root = init()?;
                write_atomic(&path, &root)?;
                debug!(path = %path.display(), root = %root.short(), "root pointer created");
                root
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            current: Mutex::new(root),
            path: Some(path),
        })
    }

    pub fn current(&self) -> Cid {
        *self.current.lock().expect("lock poisoned")
    }

    /// File this pointer is persisted to, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Move the pointer from `expected` to `new`.
    ///
    /// Fails with [`HamtError::RootConflict`] and leaves the pointer
    /// untouched if the current root is not `expected`.
    pub fn compare_and_swap(&self, expected: &Cid, new: Cid) -> HamtResult<()> {
        let mut current = self.current.lock().expect("lock poisoned");
        if *current != *expected {
            warn!(
                expected = %expected.short(),
                actual = %current.short(),
                "root pointer moved concurrently"
            );
            return Err(HamtError::RootConflict {
                expected: *expected,
                actual: *current,
            });
        }
        if *current == new {
            return Ok(());
        }
        if let Some(path) = &self.path {
            write_atomic(path, &new)?;
        }
        *current = new;
        Ok(())
    }
}

fn write_atomic(path: &Path, root: &Cid) -> HamtResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("root pointer path has no parent directory"))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new().prefix(".tmp-").tempfile_in(dir)?;
    writeln!(tmp, "{root}")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| HamtError::Io(e.error))?;
    Ok(())
}
