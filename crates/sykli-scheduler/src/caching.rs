// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cache lookup and cache write helpers (§4.2 steps 3 and 8), bridging
//! `sykli-core`'s [`Task`] shape into `sykli-cache`'s leaf hashing API.

use std::path::{Path, PathBuf};

use sykli_cache::{hash_env, hash_inputs, hash_mounts, Cache, CacheEntry, MissReason, MountView, OutputRecord};
use sykli_core::{MountKind, Task};

use crate::error::SchedulerError;

pub struct CacheKey {
    pub fingerprint: String,
    pub env_hash: String,
    pub mounts_hash: String,
    pub inputs_hash: String,
    pub input_files: Vec<PathBuf>,
}

/// Computes the fingerprint a task's cache entry is keyed by, along with the
/// sorted input file list the caller needs again to re-hash after a live run.
pub fn compute_cache_key(sykli_version: &str, workdir: &Path, task: &Task) -> Result<CacheKey, SchedulerError> {
    let env_hash = hash_env(&task.env);
    let mount_kinds: Vec<&'static str> = task
        .mounts
        .iter()
        .map(|m| match m.kind {
            MountKind::Directory => "directory",
            MountKind::Cache => "cache",
        })
        .collect();
    let mount_views: Vec<MountView<'_>> = task
        .mounts
        .iter()
        .zip(&mount_kinds)
        .map(|(m, kind)| MountView { resource_id: &m.resource_id, container_path: &m.container_path, kind })
        .collect();
    let mounts_hash = hash_mounts(&mount_views);

    let input_files = sykli_glob::expand_inputs(workdir, &task.inputs)?;
    let inputs_hash = hash_inputs(workdir, &input_files)?;

    let fingerprint = sykli_cache::compute_fingerprint(
        sykli_version,
        task.command.as_deref(),
        task.container.as_deref(),
        &env_hash,
        &mounts_hash,
        &inputs_hash,
    );

    Ok(CacheKey { fingerprint, env_hash, mounts_hash, inputs_hash, input_files })
}

/// Look up a task's cache entry. Only tasks with non-empty `inputs` are
/// cache-eligible (§4.2 step 3); callers skip this for everything else.
pub fn lookup(cache: &Cache, key: &CacheKey) -> Result<CacheEntry, MissReason> {
    cache.get(&key.fingerprint)
}

/// Restore an entry's outputs from blob storage into `workdir`.
pub fn restore_outputs(cache: &Cache, entry: &CacheEntry, workdir: &Path) -> Result<(), SchedulerError> {
    for output in &entry.outputs {
        let bytes = cache.get_blob(&output.blob_hash)?;
        let dest = workdir.join(&output.relative_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, &bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(output.mode))?;
        }
    }
    Ok(())
}

/// Read every declared output from `workdir`, store it as a content-addressed
/// blob, and persist the resulting entry under `key.fingerprint`.
pub fn store_outputs(
    cache: &Cache,
    workdir: &Path,
    task: &Task,
    key: &CacheKey,
    duration_ms: u64,
) -> Result<(), SchedulerError> {
    let mut records = Vec::with_capacity(task.outputs.len());
    for (logical_name, relative_path) in &task.outputs {
        let abs = workdir.join(relative_path);
        let bytes = std::fs::read(&abs)?;
        let size = bytes.len() as u64;
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            std::fs::metadata(&abs)?.permissions().mode()
        };
        #[cfg(not(unix))]
        let mode = 0o644;
        let blob_hash = cache.store_blob(&bytes)?;
        records.push(OutputRecord {
            logical_name: logical_name.clone(),
            relative_path: relative_path.clone(),
            blob_hash,
            mode,
            size,
        });
    }

    let entry = CacheEntry {
        command: task.command.clone(),
        container: task.container.clone(),
        env_hash: key.env_hash.clone(),
        mounts_hash: key.mounts_hash.clone(),
        inputs_hash: key.inputs_hash.clone(),
        sykli_version: sykli_version().to_string(),
        outputs: records,
        duration_ms,
        cached_at: sykli_cache::now_unix_seconds(),
        task_name: task.name.clone(),
    };
    cache.put(&key.fingerprint, &entry)?;
    Ok(())
}

pub fn sykli_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
