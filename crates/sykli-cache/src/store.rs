// SPDX-License-Identifier: MIT OR Apache-2.0
//! The on-disk content-addressed cache.
//!
//! Layout under the cache root (default `~/.sykli/cache`):
//! - `meta/<fingerprint>.json` — a serialized [`CacheEntry`]
//! - `blobs/<sha256>` — content-addressed file bytes

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::entry::CacheEntry;
use crate::error::{CacheError, MissReason};

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entry_count: usize,
    pub blob_count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanReport {
    pub removed_entries: usize,
    pub removed_blobs: usize,
}

pub struct Cache {
    root: PathBuf,
}

impl Cache {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("meta"))?;
        std::fs::create_dir_all(root.join("blobs"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn meta_path(&self, fingerprint: &str) -> PathBuf {
        self.root.join("meta").join(format!("{fingerprint}.json"))
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join("blobs").join(hash)
    }

    /// Write `path` atomically: write to a sibling temp file, then rename.
    fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let unique = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp.{}.{unique}", std::process::id()));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)
    }

    /// Look up a cache entry by fingerprint. Any I/O error degrades to a
    /// miss rather than propagating — the caller falls back to a live run.
    pub fn get(&self, fingerprint: &str) -> Result<CacheEntry, MissReason> {
        let path = self.meta_path(fingerprint);
        let raw = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => return Err(MissReason::NoCache),
        };
        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(e) => e,
            Err(_) => {
                warn!(fingerprint, "corrupt cache entry, deleting");
                let _ = std::fs::remove_file(&path);
                return Err(MissReason::Corrupted);
            }
        };
        for output in &entry.outputs {
            if !self.blob_path(&output.blob_hash).is_file() {
                return Err(MissReason::BlobsMissing);
            }
        }
        Ok(entry)
    }

    /// Persist `entry` under `fingerprint`, atomically.
    pub fn put(&self, fingerprint: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(entry)
            .map_err(|e| CacheError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        Self::atomic_write(&self.meta_path(fingerprint), &json)?;
        debug!(fingerprint, task = %entry.task_name, "cache entry written");
        Ok(())
    }

    /// Store `bytes` as a content-addressed blob, returning its hex SHA-256
    /// hash. A no-op if the blob already exists (dedup across entries).
    pub fn store_blob(&self, bytes: &[u8]) -> Result<String, CacheError> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let hash = format!("{:x}", hasher.finalize());
        let path = self.blob_path(&hash);
        if !path.is_file() {
            Self::atomic_write(&path, bytes)?;
        }
        Ok(hash)
    }

    pub fn get_blob(&self, hash: &str) -> Result<Vec<u8>, CacheError> {
        Ok(std::fs::read(self.blob_path(hash))?)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for entry in std::fs::read_dir(self.root.join("meta"))? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                stats.entry_count += 1;
            }
        }
        for entry in std::fs::read_dir(self.root.join("blobs"))? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_file() && !entry.file_name().to_string_lossy().contains(".tmp.") {
                stats.blob_count += 1;
                stats.total_bytes += meta.len();
            }
        }
        Ok(stats)
    }

    /// Remove every entry and blob.
    pub fn clean(&self) -> Result<CleanReport, CacheError> {
        self.clean_older_than(0)
    }

    /// Remove entries whose `cached_at` predates `cutoff_unix_seconds`, then
    /// sweep blobs no longer referenced by any surviving entry. Orphaned
    /// `.tmp.*` files left behind by an interrupted write are deleted too.
    pub fn clean_older_than(&self, cutoff_unix_seconds: u64) -> Result<CleanReport, CacheError> {
        let mut report = CleanReport::default();
        let mut live_blobs: HashSet<String> = HashSet::new();

        for entry in std::fs::read_dir(self.root.join("meta"))? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(".tmp.") {
                let _ = std::fs::remove_file(&path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read(&path)?;
            let cache_entry: Option<CacheEntry> = serde_json::from_slice(&raw).ok();
            match cache_entry {
                Some(cache_entry) if cache_entry.cached_at >= cutoff_unix_seconds => {
                    live_blobs.extend(cache_entry.outputs.into_iter().map(|o| o.blob_hash));
                }
                _ => {
                    std::fs::remove_file(&path)?;
                    report.removed_entries += 1;
                }
            }
        }

        for entry in std::fs::read_dir(self.root.join("blobs"))? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(".tmp.") {
                let _ = std::fs::remove_file(&path);
                continue;
            }
            if !live_blobs.contains(&name) {
                std::fs::remove_file(&path)?;
                report.removed_blobs += 1;
            }
        }
        Ok(report)
    }
}

pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compare a previously stored entry against the current task parameters to
/// explain *why* the fingerprint changed, for observability logging.
pub fn classify_change(
    previous: &CacheEntry,
    current_sykli_version: &str,
    current_command: Option<&str>,
    current_container: Option<&str>,
    current_env_hash: &str,
    current_mounts_hash: &str,
    current_inputs_hash: &str,
) -> MissReason {
    if previous.sykli_version != current_sykli_version {
        MissReason::ConfigChanged
    } else if previous.command.as_deref() != current_command {
        MissReason::CommandChanged
    } else if previous.container.as_deref() != current_container {
        MissReason::ContainerChanged
    } else if previous.env_hash != current_env_hash {
        MissReason::EnvChanged
    } else if previous.mounts_hash != current_mounts_hash {
        MissReason::MountsChanged
    } else if previous.inputs_hash != current_inputs_hash {
        MissReason::InputsChanged
    } else {
        MissReason::NoCache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            command: Some("echo hi".to_string()),
            container: None,
            env_hash: "eh".to_string(),
            mounts_hash: "mh".to_string(),
            inputs_hash: "ih".to_string(),
            sykli_version: "0.1.0".to_string(),
            outputs: Vec::new(),
            duration_ms: 10,
            cached_at: now_unix_seconds(),
            task_name: "build".to_string(),
        }
    }

    #[test]
    fn miss_on_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();
        assert_eq!(cache.get("deadbeef").unwrap_err(), MissReason::NoCache);
    }

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();
        let entry = sample_entry();
        cache.put("fp1", &entry).unwrap();
        let fetched = cache.get("fp1").unwrap();
        assert_eq!(fetched, entry);
    }

    #[test]
    fn blob_store_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();
        let h1 = cache.store_blob(b"hello").unwrap();
        let h2 = cache.store_blob(b"hello").unwrap();
        assert_eq!(h1, h2);
        let stats = cache.stats().unwrap();
        assert_eq!(stats.blob_count, 1);
    }

    #[test]
    fn missing_blob_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();
        let mut entry = sample_entry();
        entry.outputs.push(crate::entry::OutputRecord {
            logical_name: "out".to_string(),
            relative_path: "out.bin".to_string(),
            blob_hash: "missing".to_string(),
            mode: 0o644,
            size: 0,
        });
        cache.put("fp2", &entry).unwrap();
        assert_eq!(cache.get("fp2").unwrap_err(), MissReason::BlobsMissing);
    }

    #[test]
    fn corrupt_entry_is_deleted_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("meta/fp3.json"), b"not json").unwrap();
        assert_eq!(cache.get("fp3").unwrap_err(), MissReason::Corrupted);
        assert!(!dir.path().join("meta/fp3.json").exists());
    }

    #[test]
    fn clean_older_than_removes_stale_entries_and_unreferenced_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();
        let hash = cache.store_blob(b"payload").unwrap();
        let mut fresh = sample_entry();
        fresh.outputs.push(crate::entry::OutputRecord {
            logical_name: "out".to_string(),
            relative_path: "out.bin".to_string(),
            blob_hash: hash,
            mode: 0o644,
            size: 7,
        });
        let mut stale = sample_entry();
        stale.task_name = "old".to_string();
        stale.cached_at = 0;
        cache.put("fresh", &fresh).unwrap();
        cache.put("stale", &stale).unwrap();

        let report = cache.clean_older_than(1).unwrap();
        assert_eq!(report.removed_entries, 1);
        assert_eq!(report.removed_blobs, 0);
        assert!(cache.get("fresh").is_ok());
        assert_eq!(cache.get("stale").unwrap_err(), MissReason::NoCache);
    }

    #[test]
    fn classify_change_identifies_command_change() {
        let previous = sample_entry();
        let reason = classify_change(
            &previous,
            "0.1.0",
            Some("echo bye"),
            None,
            "eh",
            "mh",
            "ih",
        );
        assert_eq!(reason, MissReason::CommandChanged);
    }
}
