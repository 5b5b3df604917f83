// SPDX-License-Identifier: MIT OR Apache-2.0
//! Glob pattern compilation and deterministic input-set expansion.
//!
//! Tasks declare their cache-relevant inputs as a list of glob patterns
//! (`inputs` in the task schema). This crate turns those patterns into a
//! [`globset::GlobSet`] and walks the workspace to produce the stable,
//! sorted file list that feeds the fingerprint hash.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum GlobError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("failed to build glob set: {0}")]
    Build(#[source] globset::Error),
    #[error("failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Result of testing a path against an include/exclude pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// Matched an include pattern (or no include patterns were set) and
    /// did not match any exclude pattern.
    Allowed,
    /// Matched an exclude pattern, regardless of include status.
    DeniedByExclude,
    /// Include patterns were set and none of them matched.
    DeniedByMissingInclude,
}

impl MatchDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, MatchDecision::Allowed)
    }
}

/// A compiled include/exclude glob pair.
///
/// An empty (`None`) include set means "everything is a candidate"; an
/// empty exclude set means "nothing is excluded".
pub struct IncludeExcludeGlobs {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl IncludeExcludeGlobs {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, GlobError> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_globset(include)?)
        };
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude)?)
        };
        Ok(Self { include, exclude })
    }

    pub fn decide_path(&self, path: &Path) -> MatchDecision {
        self.decide_str(&path.to_string_lossy())
    }

    pub fn decide_str(&self, candidate: &str) -> MatchDecision {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(candidate) {
                return MatchDecision::DeniedByExclude;
            }
        }
        match &self.include {
            Some(include) if !include.is_match(candidate) => {
                MatchDecision::DeniedByMissingInclude
            }
            _ => MatchDecision::Allowed,
        }
    }
}

/// Compile a list of glob pattern strings into a single [`GlobSet`].
pub fn build_globset(patterns: &[String]) -> Result<GlobSet, GlobError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| GlobError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(GlobError::Build)
}

/// Walk `root` and return every regular file whose path (relative to
/// `root`, using forward slashes) matches at least one of `patterns`.
///
/// The result is sorted lexicographically by relative path so that the
/// same input set always hashes to the same fingerprint regardless of
/// filesystem iteration order.
pub fn expand_inputs(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, GlobError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let globs = IncludeExcludeGlobs::new(patterns, &[])?;
    let mut matched = Vec::new();
    for entry in WalkDir::new(root).into_iter() {
        let entry = entry.map_err(|source| GlobError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let normalized = relative.to_string_lossy().replace('\\', "/");
        if globs.decide_str(&normalized).is_allowed() {
            matched.push(relative.to_path_buf());
        }
    }
    matched.sort();
    Ok(matched)
}

/// Matches a single path against a single glob pattern, as used by the
/// condition DSL's `matches` operator.
pub fn single_pattern_matches(pattern: &str, candidate: &str) -> Result<bool, GlobError> {
    let glob = Glob::new(pattern).map_err(|source| GlobError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(glob.compile_matcher().is_match(candidate))
}
