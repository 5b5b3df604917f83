// SPDX-License-Identifier: MIT OR Apache-2.0
//! Git helpers for the dirty-workdir check (§4.5) and likely-cause
//! correlation (§4.7).

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run git {args:?}: {source}")]
    Spawn {
        args: Vec<String>,
        #[source]
        source: std::io::Error,
    },
    #[error("git {args:?} exited with {code:?}: {stderr}")]
    Failed {
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },
}

fn run_git(path: &Path, args: &[&str]) -> Result<String, GitError> {
    let out = Command::new("git")
        .args(args)
        .current_dir(path)
        .output()
        .map_err(|source| GitError::Spawn {
            args: args.iter().map(|s| s.to_string()).collect(),
            source,
        })?;

    if !out.status.success() {
        return Err(GitError::Failed {
            args: args.iter().map(|s| s.to_string()).collect(),
            code: out.status.code(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

/// Returns `true` if the working copy at `path` has uncommitted changes
/// (tracked modifications or untracked files), per the dirty-workdir policy.
pub fn is_dirty(path: &Path) -> Result<bool, GitError> {
    let status = run_git(path, &["status", "--porcelain=v1"])?;
    Ok(!status.trim().is_empty())
}

/// The full hash of `HEAD`.
pub fn head_ref(path: &Path) -> Result<String, GitError> {
    Ok(run_git(path, &["rev-parse", "HEAD"])?.trim().to_string())
}

/// The current branch name, or `HEAD` when detached.
pub fn current_branch(path: &Path) -> Result<String, GitError> {
    Ok(run_git(path, &["rev-parse", "--abbrev-ref", "HEAD"])?
        .trim()
        .to_string())
}

/// The fetch URL configured for `remote`, used to derive the Kubernetes
/// source-provisioning strategy (SSH vs HTTPS).
pub fn remote_url(path: &Path, remote: &str) -> Result<String, GitError> {
    Ok(run_git(path, &["remote", "get-url", remote])?.trim().to_string())
}

/// The set of files that differ between `base_ref` and the working tree,
/// deduplicated and sorted. Used to intersect against a task's `inputs`
/// globs for likely-cause correlation.
pub fn changed_paths(path: &Path, base_ref: &str) -> Result<Vec<PathBuf>, GitError> {
    let out = run_git(path, &["diff", "--name-only", base_ref, "HEAD"])?;
    let mut paths: Vec<PathBuf> = out.lines().map(PathBuf::from).collect();
    paths.sort();
    paths.dedup();
    Ok(paths)
}
