use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use cask_catalog::SyncMode;
use cask_engine::EngineConfig;

/// Contents of `<root>/cask.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaskConfig {
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `fsync` blobs and journal entries on every write.
    pub fsync: bool,
}

impl CaskConfig {
    /// Read the config under `root`. A missing file means defaults.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = Layout::new(root).config_path();
        match fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("invalid config {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }

    pub fn save(&self, root: &Path) -> anyhow::Result<()> {
        let path = Layout::new(root).config_path();
        let text = toml::to_string_pretty(self)?;
        fs::write(&path, text).with_context(|| format!("cannot write {}", path.display()))
    }

    pub fn sync_mode(&self) -> SyncMode {
        if self.storage.fsync {
            SyncMode::EveryWrite
        } else {
            SyncMode::OsDefault
        }
    }
}

/// Paths inside a store root.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("cask.toml")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.root.join("catalog.journal")
    }
}
