//! On-disk record of upload and deployment progress.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory caches are written to unless `--cache-dir` says otherwise
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Failure to read or write a cache file
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("could not read cache file {}", .0.display())]
    Read(PathBuf, #[source] io::Error),
    #[error("could not write cache file {}", .0.display())]
    Write(PathBuf, #[source] io::Error),
    #[error("cache file {} is not valid JSON", .0.display())]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("could not serialize cache")]
    Serialize(#[from] serde_json::Error),
}

/// One uploaded asset and whether its config line has been committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub link: String,
    pub name: String,
    #[serde(default)]
    pub on_chain: bool,
}

/// The collection config an upload run writes into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    /// Six-character id the candy machine address is derived from
    pub uuid: String,
    /// Base58 address of the config account
    pub config: String,
}

/// Progress of one collection on one cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cache {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<ProgramEntry>,
    #[serde(default)]
    pub items: BTreeMap<u32, Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candy_machine_address: Option<String>,
}

impl Cache {
    /// Number of items whose config line has not been committed yet
    #[must_use]
    pub fn pending(&self) -> usize { self.items.values().filter(|i| !i.on_chain).count() }
}

/// Location of a named cache for one cluster environment
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl AsRef<Path>, env: &str, cache_name: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{env}-{cache_name}")),
        }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// Load the cache, or `None` if it has never been written
    pub fn load(&self) -> Result<Option<Cache>, CacheError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Read(self.path.clone(), e)),
        };

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| CacheError::Parse(self.path.clone(), e))
    }

    /// Load the cache, starting empty if it has never been written
    pub fn load_or_default(&self) -> Result<Cache, CacheError> {
        self.load().map(Option::unwrap_or_default)
    }

    /// Write `cache`, creating the cache directory if needed
    pub fn save(&self, cache: &Cache) -> Result<(), CacheError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| CacheError::Write(self.path.clone(), e))?;
        }

        let json = serde_json::to_string(cache)?;
        fs::write(&self.path, json).map_err(|e| CacheError::Write(self.path.clone(), e))?;

        tracing::debug!(path = %self.path.display(), items = cache.items.len(), "saved cache");
        Ok(())
    }
}
