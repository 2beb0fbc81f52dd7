#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Result cache keyed by the classification parameter pair.
//!
//! Each entry is a directory `<root>/<within>_<near>/` holding the exported
//! artifact set and an `entry.json` describing it. Entries are never
//! updated or evicted.
//!
//! A miss computes into a private staging directory which is renamed into
//! place only after the computation succeeded, so readers never see a
//! half-written entry. Within a process, one lock per key makes sure the
//! computation for a key runs at most once at a time; across processes the
//! rename still keeps entries whole, although two workers may compute the
//! same key.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use heatsrc_suitability_models::ClassificationParams;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// File describing an entry.
pub const ENTRY_FILE: &str = "entry.json";

/// Errors raised by the cache itself.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Entry file could not be written or read.
    #[error("Invalid cache entry {path}: {source}")]
    Json {
        /// Path of the entry file.
        path: String,
        /// Serialization error.
        source: serde_json::Error,
    },

    /// The computation reported an artifact outside its staging directory.
    #[error("Artifact {path} was not written into the staging directory")]
    ArtifactOutsideStaging {
        /// Reported artifact path.
        path: String,
    },

    /// The computation reported an artifact that does not exist.
    #[error("Artifact {path} does not exist")]
    MissingArtifact {
        /// Reported artifact path.
        path: String,
    },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// The literal parameter pair an entry is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Inner radius in meters.
    pub within_dist: u32,
    /// Outer radius in meters.
    pub near_dist: u32,
}

impl CacheKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(within_dist: u32, near_dist: u32) -> Self {
        Self {
            within_dist,
            near_dist,
        }
    }

    /// Directory name of the entry.
    #[must_use]
    pub fn dir_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.within_dist, self.near_dist)
    }
}

impl From<&ClassificationParams> for CacheKey {
    fn from(params: &ClassificationParams) -> Self {
        Self::new(params.within_dist, params.near_dist)
    }
}

/// Contents of `entry.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryFile<M> {
    key: CacheKey,
    artifact: PathBuf,
    created_at: DateTime<Utc>,
    metadata: M,
}

/// What a computation hands back to the cache.
#[derive(Debug, Clone)]
pub struct ComputedArtifact<M> {
    /// Main artifact file, inside the staging directory.
    pub artifact: PathBuf,
    /// Data stored alongside the artifact and returned on every hit.
    pub metadata: M,
}

/// An entry returned by [`ResultCache::get_or_compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct CachedArtifact<M> {
    /// Main artifact file inside the entry directory.
    pub path: PathBuf,
    /// Metadata stored with the entry.
    pub metadata: M,
    /// When the entry was committed.
    pub created_at: DateTime<Utc>,
    /// `true` if the entry existed before this call.
    pub from_cache: bool,
}

/// Filesystem-backed, append-only result cache.
pub struct ResultCache {
    root: PathBuf,
    locks: Mutex<BTreeMap<CacheKey, Arc<Mutex<()>>>>,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    /// Opens a cache rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the entry for `key`, whether or not it exists.
    #[must_use]
    pub fn entry_dir(&self, key: CacheKey) -> PathBuf {
        self.root.join(key.dir_name())
    }

    /// Whether a complete entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: CacheKey) -> bool {
        let dir = self.entry_dir(key);
        read_entry::<serde_json::Value>(&dir)
            .ok()
            .flatten()
            .is_some_and(|entry| dir.join(&entry.artifact).is_file())
    }

    fn key_lock(&self, key: CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    /// Returns the entry for `key`, computing it first on a miss.
    ///
    /// `compute` receives an empty staging directory and must write the
    /// whole artifact set into it. On success the directory becomes the
    /// entry; on failure it is deleted and the key stays absent.
    ///
    /// # Errors
    ///
    /// Returns the computation's error unchanged, or a [`CacheError`]
    /// (converted into `E`) if the entry cannot be read or committed.
    pub fn get_or_compute<M, E, F>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<CachedArtifact<M>, E>
    where
        M: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce(&Path) -> Result<ComputedArtifact<M>, E>,
    {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(hit) = self.lookup(key)? {
            log::info!("Cache hit for {key}");
            return Ok(hit);
        }

        log::info!("Cache miss for {key}, computing");
        std::fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, e))?;
        let staging = self
            .root
            .join(format!(".{key}.tmp-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&staging).map_err(|e| CacheError::io(&staging, e))?;

        let result = compute(&staging).and_then(|computed| {
            self.commit(key, &staging, computed)
                .map_err(E::from)
        });

        if staging.exists() {
            let _ = std::fs::remove_dir_all(&staging);
        }

        result
    }

    fn lookup<M: DeserializeOwned>(
        &self,
        key: CacheKey,
    ) -> Result<Option<CachedArtifact<M>>, CacheError> {
        let dir = self.entry_dir(key);
        let entry = match read_entry::<M>(&dir) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(CacheError::Json { path, source }) => {
                log::warn!("Discarding unreadable cache entry {path}: {source}");
                discard(&dir)?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let path = dir.join(&entry.artifact);
        if !path.is_file() {
            log::warn!(
                "Discarding cache entry {key}: artifact {} is missing",
                path.display()
            );
            discard(&dir)?;
            return Ok(None);
        }

        Ok(Some(CachedArtifact {
            path,
            metadata: entry.metadata,
            created_at: entry.created_at,
            from_cache: true,
        }))
    }

    fn commit<M: Serialize + DeserializeOwned>(
        &self,
        key: CacheKey,
        staging: &Path,
        computed: ComputedArtifact<M>,
    ) -> Result<CachedArtifact<M>, CacheError> {
        let relative = computed
            .artifact
            .strip_prefix(staging)
            .map_err(|_| CacheError::ArtifactOutsideStaging {
                path: computed.artifact.display().to_string(),
            })?
            .to_path_buf();
        if !computed.artifact.is_file() {
            return Err(CacheError::MissingArtifact {
                path: computed.artifact.display().to_string(),
            });
        }

        let entry = EntryFile {
            key,
            artifact: relative,
            created_at: Utc::now(),
            metadata: computed.metadata,
        };
        let entry_path = staging.join(ENTRY_FILE);
        let contents = serde_json::to_string_pretty(&entry).map_err(|source| CacheError::Json {
            path: entry_path.display().to_string(),
            source,
        })?;
        std::fs::write(&entry_path, contents).map_err(|e| CacheError::io(&entry_path, e))?;

        let dir = self.entry_dir(key);
        if let Err(e) = std::fs::rename(staging, &dir) {
            // Another process may have committed the same key meanwhile.
            if let Some(existing) = self.lookup(key)? {
                log::info!("Cache entry {key} was committed concurrently, reusing it");
                return Ok(CachedArtifact {
                    from_cache: false,
                    ..existing
                });
            }
            return Err(CacheError::io(&dir, e));
        }

        log::info!("Committed cache entry {}", dir.display());
        Ok(CachedArtifact {
            path: dir.join(&entry.artifact),
            metadata: entry.metadata,
            created_at: entry.created_at,
            from_cache: false,
        })
    }
}

fn read_entry<M: DeserializeOwned>(dir: &Path) -> Result<Option<EntryFile<M>>, CacheError> {
    let path = dir.join(ENTRY_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| CacheError::io(&path, e))?;
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| CacheError::Json {
            path: path.display().to_string(),
            source,
        })
}

fn discard(dir: &Path) -> Result<(), CacheError> {
    std::fs::remove_dir_all(dir).map_err(|e| CacheError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error(transparent)]
        Cache(#[from] CacheError),
        #[error("pipeline failed")]
        Pipeline,
    }

    fn cache(name: &str) -> ResultCache {
        let root = std::env::temp_dir().join(format!("heatsrc_cache_{name}"));
        let _ = std::fs::remove_dir_all(&root);
        ResultCache::new(root)
    }

    fn write_artifact(dir: &Path) -> Result<ComputedArtifact<Vec<String>>, TestError> {
        for ext in ["shp", "shx", "dbf", "prj"] {
            std::fs::write(dir.join(format!("wwtp_potential.{ext}")), ext).unwrap();
        }
        Ok(ComputedArtifact {
            artifact: dir.join("wwtp_potential.shp"),
            metadata: vec!["3 plants".to_string()],
        })
    }

    #[test]
    fn key_directory_uses_both_values() {
        assert_eq!(CacheKey::new(150, 1000).dir_name(), "150_1000");
        assert_eq!(
            CacheKey::from(&ClassificationParams::new(15, 100)).dir_name(),
            "15_100"
        );
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = cache("hit");
        let key = CacheKey::new(150, 1000);
        let runs = AtomicUsize::new(0);

        let first = cache
            .get_or_compute(key, |dir| {
                runs.fetch_add(1, Ordering::SeqCst);
                write_artifact(dir)
            })
            .unwrap();
        let second = cache
            .get_or_compute(key, |dir| {
                runs.fetch_add(1, Ordering::SeqCst);
                write_artifact(dir)
            })
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.path, second.path);
        assert_eq!(second.metadata, vec!["3 plants".to_string()]);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(first.path, cache.root().join("150_1000/wwtp_potential.shp"));
        assert!(cache.contains(key));
        let _ = std::fs::remove_dir_all(cache.root());
    }

    #[test]
    fn failed_computation_leaves_key_absent() {
        let cache = cache("failure");
        let key = CacheKey::new(150, 1000);

        let result: Result<CachedArtifact<Vec<String>>, TestError> =
            cache.get_or_compute(key, |dir| {
                std::fs::write(dir.join("wwtp_potential.shp"), "partial").unwrap();
                Err(TestError::Pipeline)
            });

        assert!(matches!(result, Err(TestError::Pipeline)));
        assert!(!cache.contains(key));
        assert!(!cache.entry_dir(key).exists());
        let leftovers = std::fs::read_dir(cache.root()).unwrap().count();
        assert_eq!(leftovers, 0);

        let retried = cache.get_or_compute(key, write_artifact).unwrap();
        assert!(!retried.from_cache);
        let _ = std::fs::remove_dir_all(cache.root());
    }

    #[test]
    fn artifact_outside_staging_is_rejected() {
        let cache = cache("outside");
        let result: Result<CachedArtifact<()>, TestError> =
            cache.get_or_compute(CacheKey::new(1, 2), |_| {
                Ok(ComputedArtifact {
                    artifact: PathBuf::from("/elsewhere/wwtp_potential.shp"),
                    metadata: (),
                })
            });
        assert!(matches!(
            result,
            Err(TestError::Cache(CacheError::ArtifactOutsideStaging { .. }))
        ));
        assert!(!cache.contains(CacheKey::new(1, 2)));
        let _ = std::fs::remove_dir_all(cache.root());
    }

    #[test]
    fn entry_with_missing_artifact_is_recomputed() {
        let cache = cache("broken");
        let key = CacheKey::new(150, 1000);
        let first = cache.get_or_compute(key, write_artifact).unwrap();
        std::fs::remove_file(&first.path).unwrap();

        assert!(!cache.contains(key));
        let second = cache.get_or_compute(key, write_artifact).unwrap();
        assert!(!second.from_cache);
        assert!(second.path.is_file());
        let _ = std::fs::remove_dir_all(cache.root());
    }

    #[test]
    fn concurrent_misses_compute_once() {
        let cache = cache("concurrent");
        let key = CacheKey::new(150, 1000);
        let runs = AtomicUsize::new(0);
        let barrier = Barrier::new(4);

        let (cache, runs, barrier) = (&cache, &runs, &barrier);
        let results = std::thread::scope(|s| {
            let handles = (0..4)
                .map(move |_| {
                    s.spawn(move || {
                        barrier.wait();
                        cache
                            .get_or_compute(key, |dir| {
                                runs.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(std::time::Duration::from_millis(20));
                                write_artifact(dir)
                            })
                            .unwrap()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| !r.from_cache).count(), 1);
        assert!(results.iter().all(|r| r.path == results[0].path));
        let _ = std::fs::remove_dir_all(cache.root());
    }
}
