// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic fingerprint computation.
//!
//! `fingerprint = SHA-256(sykli_version || command || container || env_hash
//! || mounts_hash || inputs_hash)`. Every sub-hash is computed over a
//! canonical, sorted representation so that declaration order (of env
//! entries, mount lists, or glob expansion order) never perturbs the key.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash a task's environment map. `env` is a `BTreeMap` so iteration order
/// is already canonical (sorted by key).
pub fn hash_env(env: &BTreeMap<String, String>) -> String {
    let mut buf = String::new();
    for (k, v) in env {
        buf.push_str(k);
        buf.push('=');
        buf.push_str(v);
        buf.push('\n');
    }
    hex_sha256(buf.as_bytes())
}

/// A single mount as seen by the fingerprint, independent of `sykli-core`'s
/// `Mount` type so this crate stays a leaf.
pub struct MountView<'a> {
    pub resource_id: &'a str,
    pub container_path: &'a str,
    pub kind: &'a str,
}

/// Hash a task's mount list, sorted by `(resource_id, container_path)` so
/// declaration order does not affect the key.
pub fn hash_mounts(mounts: &[MountView<'_>]) -> String {
    let mut sorted: Vec<&MountView<'_>> = mounts.iter().collect();
    sorted.sort_by_key(|m| (m.resource_id, m.container_path));
    let mut buf = String::new();
    for m in sorted {
        buf.push_str(m.resource_id);
        buf.push(':');
        buf.push_str(m.container_path);
        buf.push(':');
        buf.push_str(m.kind);
        buf.push('\n');
    }
    hex_sha256(buf.as_bytes())
}

/// Hash the ordered list of `(relative_path, sha256(file_content))` pairs
/// for every file matching the task's `inputs` glob set.
///
/// `files` must already be sorted by relative path (as produced by
/// `sykli_glob::expand_inputs`) for the hash to be declaration-order
/// independent; this function does not re-sort, since the caller already
/// holds the canonical ordering and re-sorting here would mean re-deriving
/// the relative paths from absolute ones.
pub fn hash_inputs(root: &Path, files: &[std::path::PathBuf]) -> io::Result<String> {
    let mut buf = String::new();
    for relative in files {
        let absolute = root.join(relative);
        let contents = std::fs::read(&absolute)?;
        let file_hash = hex_sha256(&contents);
        buf.push_str(&relative.to_string_lossy());
        buf.push(':');
        buf.push_str(&file_hash);
        buf.push('\n');
    }
    Ok(hex_sha256(buf.as_bytes()))
}

/// Compute the final cache-key fingerprint from the task's exact inputs.
pub fn compute_fingerprint(
    sykli_version: &str,
    command: Option<&str>,
    container: Option<&str>,
    env_hash: &str,
    mounts_hash: &str,
    inputs_hash: &str,
) -> String {
    let mut buf = String::new();
    buf.push_str(sykli_version);
    buf.push('|');
    buf.push_str(command.unwrap_or(""));
    buf.push('|');
    buf.push_str(container.unwrap_or(""));
    buf.push('|');
    buf.push_str(env_hash);
    buf.push('|');
    buf.push_str(mounts_hash);
    buf.push('|');
    buf.push_str(inputs_hash);
    hex_sha256(buf.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_hash_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("B".to_string(), "2".to_string());
        a.insert("A".to_string(), "1".to_string());
        let mut b = BTreeMap::new();
        b.insert("A".to_string(), "1".to_string());
        b.insert("B".to_string(), "2".to_string());
        assert_eq!(hash_env(&a), hash_env(&b));
    }

    #[test]
    fn mounts_hash_is_declaration_order_independent() {
        let m1 = vec![
            MountView {
                resource_id: "r1",
                container_path: "/a",
                kind: "directory",
            },
            MountView {
                resource_id: "r2",
                container_path: "/b",
                kind: "cache",
            },
        ];
        let m2 = vec![
            MountView {
                resource_id: "r2",
                container_path: "/b",
                kind: "cache",
            },
            MountView {
                resource_id: "r1",
                container_path: "/a",
                kind: "directory",
            },
        ];
        assert_eq!(hash_mounts(&m1), hash_mounts(&m2));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = compute_fingerprint("1.0", Some("echo hi"), None, "eh", "mh", "ih");
        let b = compute_fingerprint("1.0", Some("echo hi"), None, "eh", "mh", "ih");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_command() {
        let a = compute_fingerprint("1.0", Some("echo hi"), None, "eh", "mh", "ih");
        let b = compute_fingerprint("1.0", Some("echo bye"), None, "eh", "mh", "ih");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_inputs_reflects_file_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let files = vec![std::path::PathBuf::from("a.txt")];
        let h1 = hash_inputs(dir.path(), &files).unwrap();
        std::fs::write(dir.path().join("a.txt"), "world").unwrap();
        let h2 = hash_inputs(dir.path(), &files).unwrap();
        assert_ne!(h1, h2);
    }
}
