use std::path::{Path, PathBuf};

use mdag_hamt::HamtConfig;
use mdag_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{DagError, DagResult};

/// Environment variable overriding [`DagConfig::storage_root`].
pub const STORAGE_ROOT_ENV: &str = "MDAG_STORAGE_ROOT";

/// Configuration for a filesystem-backed [`MerkleDag`](crate::MerkleDag).
///
/// ```toml
/// storage_root = "/var/lib/mdag"
///
/// [store]
/// sync_mode = "every_write"
/// verify_on_read = true
///
/// [hamt]
/// bit_width = 5
/// bucket_size = 3
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DagConfig {
    /// Directory holding `blocks/` and `refs/`.
    pub storage_root: PathBuf,
    pub store: StoreConfig,
    pub hamt: HamtConfig,
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("data/mdag"),
            store: StoreConfig::default(),
            hamt: HamtConfig::default(),
        }
    }
}

impl DagConfig {
    /// Defaults with the storage root taken from the environment, if set.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> DagResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| DagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> DagResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?.with_env_overrides())
    }

    pub fn to_toml_string(&self) -> DagResult<String> {
        toml::to_string_pretty(self).map_err(|e| DagError::Config(e.to_string()))
    }

    /// Replace the storage root with `$MDAG_STORAGE_ROOT` when it is set and
    /// non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(root) = std::env::var_os(STORAGE_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.storage_root = PathBuf::from(root);
        }
        self
    }

    pub fn validate(&self) -> DagResult<()> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(DagError::Config("storage_root must not be empty".to_string()));
        }
        self.hamt
            .validate()
            .map_err(|e| DagError::Config(e.to_string()))
    }

    pub fn blocks_dir(&self) -> PathBuf {
        self.storage_root.join("blocks")
    }

    pub fn refs_dir(&self) -> PathBuf {
        self.storage_root.join("refs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdag_store::SyncMode;

    #[test]
    fn default_config() {
        let c = DagConfig::default();
        assert_eq!(c.storage_root, PathBuf::from("data/mdag"));
        assert_eq!(c.store, StoreConfig::default());
        assert_eq!(c.hamt, HamtConfig::default());
        assert_eq!(c.blocks_dir(), PathBuf::from("data/mdag/blocks"));
        assert_eq!(c.refs_dir(), PathBuf::from("data/mdag/refs"));
    }

    #[test]
    fn parse_minimal_toml() {
        let c = DagConfig::from_toml_str(r#"storage_root = "/srv/mdag""#).unwrap();
        assert_eq!(c.storage_root, PathBuf::from("/srv/mdag"));
        assert_eq!(c.hamt.bit_width, 5);
        assert!(c.store.verify_on_read);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
            storage_root = "/srv/mdag"

            [store]
            sync_mode = "os_default"
            verify_on_read = false

            [hamt]
            bit_width = 4
            bucket_size = 8
        "#;
        let c = DagConfig::from_toml_str(toml).unwrap();
        assert_eq!(c.store.sync_mode, SyncMode::OsDefault);
        assert!(!c.store.verify_on_read);
        assert_eq!(c.hamt.bit_width, 4);
        assert_eq!(c.hamt.bucket_size, 8);
    }

    #[test]
    fn invalid_hamt_is_config_error() {
        let err = DagConfig::from_toml_str("[hamt]\nbit_width = 9\n").unwrap_err();
        assert!(matches!(err, DagError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = DagConfig::from_toml_str("storage_root = ").unwrap_err();
        assert!(matches!(err, DagError::Config(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let c = DagConfig {
            storage_root: PathBuf::from("/tmp/x"),
            ..DagConfig::default()
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(DagConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdag.toml");
        std::fs::write(&path, "[hamt]\nbucket_size = 5\n").unwrap();
        let c = DagConfig::load(&path).unwrap();
        assert_eq!(c.hamt.bucket_size, 5);

        let err = DagConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, DagError::Io(_)));
    }

    #[test]
    fn env_overrides_storage_root() {
        std::env::set_var(STORAGE_ROOT_ENV, "/from/env");
        let c = DagConfig::from_env();
        std::env::remove_var(STORAGE_ROOT_ENV);
        assert_eq!(c.storage_root, PathBuf::from("/from/env"));
    }
}
