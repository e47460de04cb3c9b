//! Persistent result cache
//!
//! A write-once map from ordered pair key to evaluation outcome. The whole
//! document is read at startup and rewritten on every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::metrics::Metrics;

/// Order-sensitive key of a candidate pair
pub fn cache_key(tool1: &str, tool2: &str) -> String {
    format!("{}_{}", tool1, tool2)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default)]
    pub key: String,
    pub tool1_name: String,
    pub tool2_name: String,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub specificity: f64,
    pub report: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn new(
        tool1: impl Into<String>,
        tool2: impl Into<String>,
        metrics: Metrics,
        report: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        let tool1_name = tool1.into();
        let tool2_name = tool2.into();
        Self {
            key: cache_key(&tool1_name, &tool2_name),
            tool1_name,
            tool2_name,
            accuracy: metrics.accuracy,
            precision: metrics.precision,
            recall: metrics.recall,
            specificity: metrics.specificity,
            report: report.into(),
            mode: Some(mode.into()),
            evaluated_at: Some(Utc::now()),
        }
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            accuracy: self.accuracy,
            precision: self.precision,
            recall: self.recall,
            specificity: self.specificity,
        }
    }
}

pub struct ResultCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl ResultCache {
    /// Open the cache at `path`. A missing file is an empty cache; a corrupt
    /// one is moved aside and replaced by an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, CacheEntry>>(&content) {
                Ok(mut entries) => {
                    for (key, entry) in entries.iter_mut() {
                        if entry.key.is_empty() {
                            entry.key = key.clone();
                        }
                    }
                    info!("Loaded {} cache entries from {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    quarantine(&path, &e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Creating new cache at {}", path.display());
                BTreeMap::new()
            }
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, CacheEntry>>, CacheError> {
        self.entries.lock().map_err(|_| CacheError::Lock)
    }

    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.lock()?.get(key).cloned())
    }

    pub fn contains(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.lock()?.contains_key(key))
    }

    /// Store an entry under `key`. Existing keys are never overwritten;
    /// returns whether the entry was stored.
    pub fn put(&self, key: &str, mut entry: CacheEntry) -> Result<bool, CacheError> {
        let mut entries = self.lock()?;
        if entries.contains_key(key) {
            debug!("Cache key {} already present, keeping stored entry", key);
            return Ok(false);
        }

        entry.key = key.to_string();
        entries.insert(key.to_string(), entry);
        if let Err(e) = self.persist(&entries) {
            entries.remove(key);
            return Err(e);
        }
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        let previous = std::mem::take(&mut *entries);
        if let Err(e) = self.persist(&entries) {
            *entries = previous;
            return Err(e);
        }
        info!("Cleared cache at {}", self.path.display());
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.lock()?.is_empty())
    }

    /// All entries, best accuracy first; ties by key
    pub fn sorted_by_accuracy(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries: Vec<CacheEntry> = self.lock()?.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.accuracy
                .partial_cmp(&a.accuracy)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(entries)
    }

    pub fn best_entry(&self) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.sorted_by_accuracy()?.into_iter().next())
    }

    fn persist(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        let tmp = temp_path(&self.path);
        std::fs::write(&tmp, content).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!("Wrote {} cache entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn quarantine(path: &Path, err: &serde_json::Error) {
    let mut target = path.as_os_str().to_owned();
    target.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")));
    let target = PathBuf::from(target);

    match std::fs::rename(path, &target) {
        Ok(()) => warn!(
            "Cache file {} is corrupt ({}), moved to {} and starting empty",
            path.display(),
            err,
            target.display()
        ),
        Err(e) => warn!(
            "Cache file {} is corrupt ({}) and could not be moved aside ({}), starting empty",
            path.display(),
            err,
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tool1: &str, tool2: &str, accuracy: f64) -> CacheEntry {
        CacheEntry::new(
            tool1,
            tool2,
            Metrics {
                accuracy,
                ..Metrics::default()
            },
            format!("report {} {}", tool1, tool2),
            "per-patient",
        )
    }

    #[test]
    fn test_put_get_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = ResultCache::open(&path).unwrap();
        assert!(cache.is_empty().unwrap());
        let stored = entry("a", "b", 75.0);
        assert!(cache.put("a_b", stored.clone()).unwrap());
        assert_eq!(cache.get("a_b").unwrap(), Some(stored.clone()));

        let reopened = ResultCache::open(&path).unwrap();
        assert_eq!(reopened.get("a_b").unwrap(), Some(stored));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_put_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::open(dir.path().join("cache.json")).unwrap();

        let first = entry("a", "b", 50.0);
        assert!(cache.put("a_b", first.clone()).unwrap());
        assert!(!cache.put("a_b", entry("a", "b", 90.0)).unwrap());
        assert_eq!(cache.get("a_b").unwrap(), Some(first));
    }

    #[test]
    fn test_sorted_by_accuracy() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::open(dir.path().join("cache.json")).unwrap();
        cache.put("c_d", entry("c", "d", 60.0)).unwrap();
        cache.put("a_b", entry("a", "b", 80.0)).unwrap();
        cache.put("b_a", entry("b", "a", 60.0)).unwrap();

        let keys: Vec<String> = cache
            .sorted_by_accuracy()
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["a_b", "b_a", "c_d"]);
        assert_eq!(cache.best_entry().unwrap().unwrap().key, "a_b");
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = ResultCache::open(&path).unwrap();
        cache.put("a_b", entry("a", "b", 50.0)).unwrap();
        cache.clear().unwrap();

        assert!(cache.is_empty().unwrap());
        assert!(ResultCache::open(&path).unwrap().is_empty().unwrap());
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cache = ResultCache::open(&path).unwrap();
        assert!(cache.is_empty().unwrap());
        assert!(!path.exists());

        let moved: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("cache.json.corrupt-"))
            .collect();
        assert_eq!(moved.len(), 1);
    }

    #[test]
    fn test_loads_legacy_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            r#"{"a_b": {"tool1_name": "a", "tool2_name": "b", "accuracy": 62.5,
                "precision": 60.0, "recall": 75.0, "specificity": 50.0, "report": "r"}}"#,
        )
        .unwrap();

        let cache = ResultCache::open(&path).unwrap();
        let loaded = cache.get("a_b").unwrap().unwrap();
        assert_eq!(loaded.key, "a_b");
        assert_eq!(loaded.mode, None);
        assert_eq!(loaded.metrics().recall, 75.0);
    }
}
