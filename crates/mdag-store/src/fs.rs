//! Filesystem block store.
//!
//! On-disk layout:
//! ```text
//! <root>/
//!   00/ 01/ … ff/            shard directories (first two digest hex chars)
//!     <62 hex chars>         one file per block, canonical node bytes
//! ```
//!
//! Blocks are written to a temporary file inside the target shard and
//! renamed into place, so a reader never observes a partial block.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use mdag_types::Cid;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{StoreConfig, SyncMode};
use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockStore, StoreStats};

/// Prefix of in-flight temporary files. Never a valid shard leaf name.
const TEMP_PREFIX: &str = ".tmp-";

/// Sharded on-disk block store.
#[derive(Debug)]
pub struct FsBlockStore {
    root: PathBuf,
    config: StoreConfig,
}

impl FsBlockStore {
    /// Open the store at `root`, creating the root and every shard directory.
    ///
    /// Safe to call any number of times on the same path.
    pub fn init(root: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        for shard in 0..=u8::MAX {
            fs::create_dir_all(root.join(format!("{shard:02x}")))?;
        }
        info!(root = %root.display(), sync = ?config.sync_mode, "block store initialized");
        Ok(Self { root, config })
    }

    /// The directory holding the shard directories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the file a block with this CID lives in.
    pub fn block_path(&self, cid: &Cid) -> PathBuf {
        let shard = cid.shard();
        self.root.join(shard.prefix).join(shard.suffix)
    }

    /// Visit every block file as `(shard name, cid, size)`. Files whose
    /// names do not form a CID are skipped.
    fn for_each_block(&self, mut f: impl FnMut(&str, Cid, u64)) -> StoreResult<()> {
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() || is_temp(entry.file_name()) {
                continue;
            }
            let (Some(leaf), Some(shard)) = (
                entry.file_name().to_str(),
                entry
                    .path()
                    .parent()
                    .and_then(Path::file_name)
                    .and_then(OsStr::to_str),
            ) else {
                continue;
            };
            let cid = match Cid::from_shard(shard, leaf) {
                Ok(cid) => cid,
                Err(e) => {
                    warn!(shard, leaf, error = %e, "skipping foreign file in block store");
                    continue;
                }
            };
            let size = entry.metadata().map_err(io::Error::from)?.len();
            f(shard, cid, size);
        }
        Ok(())
    }
}

fn is_temp(name: &OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with(TEMP_PREFIX))
}

impl BlockStore for FsBlockStore {
    fn write_block(&self, bytes: &[u8]) -> StoreResult<Cid> {
        let cid = Cid::from_content(bytes);
        let path = self.block_path(&cid);
        if path.try_exists()? {
            debug!(cid = %cid.short(), "block already present");
            return Ok(cid);
        }

        let shard_dir = path
            .parent()
            .ok_or_else(|| io::Error::other("block path has no shard directory"))?;
        fs::create_dir_all(shard_dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(shard_dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(cid = %cid.short(), len = bytes.len(), "block written");
        Ok(cid)
    }

    fn read_block(&self, cid: &Cid) -> StoreResult<Option<Vec<u8>>> {
        let bytes = match fs::read(self.block_path(cid)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if self.config.verify_on_read && !cid.matches(&bytes) {
            warn!(cid = %cid, "block content does not match its CID");
            return Err(StoreError::CorruptBlock {
                cid: *cid,
                reason: "content hash mismatch".to_string(),
            });
        }
        Ok(Some(bytes))
    }

    fn has(&self, cid: &Cid) -> StoreResult<bool> {
        Ok(self.block_path(cid).try_exists()?)
    }

    fn delete(&self, cid: &Cid) -> StoreResult<bool> {
        match fs::remove_file(self.block_path(cid)) {
            Ok(()) => {
                debug!(cid = %cid.short(), "block deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let mut stats = StoreStats::default();
        let mut shards = BTreeSet::new();
        self.for_each_block(|shard, _, size| {
            stats.total_blocks += 1;
            stats.total_bytes += size;
            shards.insert(shard.to_string());
        })?;
        stats.shard_count = shards.len() as u64;
        Ok(stats)
    }

    fn list(&self) -> StoreResult<Vec<Cid>> {
        let mut cids = Vec::new();
        self.for_each_block(|_, cid, _| cids.push(cid))?;
        cids.sort();
        Ok(cids)
    }
}
