use fs2::FileExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use super::DatabaseError;

/// Files backing one registered paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperEntry {
    pub csv: PathBuf,
    pub inst: PathBuf,
}

/// The `papers.json` map from paper title to its files.
pub struct PaperRegistry {
    path: PathBuf,
}

impl PaperRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DatabaseError + '_ {
        move |source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Reads the registry; a missing file is an empty registry.
    pub fn load(&self) -> Result<BTreeMap<String, PaperEntry>, DatabaseError> {
        if !self.path.exists() {
            debug!("{} not found, no papers registered yet", self.path.display());
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&self.path).map_err(Self::io_error(&self.path))?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub fn get(&self, title: &str) -> Result<Option<PaperEntry>, DatabaseError> {
        Ok(self.load()?.remove(title))
    }

    /// Adds or replaces `title` under an exclusive lock.
    ///
    /// The new map is written to a temporary file and renamed over the
    /// registry, so readers never see a partial file.
    pub fn insert(&self, title: &str, entry: PaperEntry) -> Result<(), DatabaseError> {
        let lock_path = self.lock_path();
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(Self::io_error(&lock_path))?;
        lock.lock_exclusive().map_err(Self::io_error(&lock_path))?;

        let result = self.write_locked(title, entry);

        if let Err(e) = lock.unlock() {
            warn!("failed to release {}: {}", lock_path.display(), e);
        }
        result
    }

    fn write_locked(&self, title: &str, entry: PaperEntry) -> Result<(), DatabaseError> {
        let mut papers = self.load()?;
        if papers.insert(title.to_string(), entry).is_some() {
            warn!("paper '{}' was already registered, replacing its entry", title);
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(&papers)?;
        fs::write(&tmp_path, text).map_err(Self::io_error(&tmp_path))?;
        fs::rename(&tmp_path, &self.path).map_err(Self::io_error(&self.path))?;
        Ok(())
    }
}
