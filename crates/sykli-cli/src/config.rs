// SPDX-License-Identifier: MIT OR Apache-2.0
//! `EngineConfig`: parallelism cap, cache root, history root, default
//! target, and global timeout, loadable from `sykli.toml` with
//! environment-variable overrides. Schema-free TOML merge with explicit
//! defaults, following the teacher's `abp-config` pattern.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sykli_core::TargetKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_timeout_seconds: Option<u64>,
}

impl EngineConfig {
    pub fn cache_root_path(&self) -> PathBuf {
        match &self.cache_root {
            Some(root) => PathBuf::from(root),
            None => home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".sykli").join("cache"),
        }
    }

    pub fn history_root_path(&self, project_root: &Path) -> PathBuf {
        match &self.history_root {
            Some(root) => PathBuf::from(root),
            None => project_root.to_path_buf(),
        }
    }

    pub fn default_target(&self) -> TargetKind {
        match self.default_target.as_deref() {
            Some("k8s") => TargetKind::K8s,
            _ => TargetKind::Local,
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Load `sykli.toml` from `path` if present, falling back to defaults, then
/// apply environment overrides on top.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let mut config = if path.is_file() {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?
    } else {
        EngineConfig::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recognised overrides: `SYKLI_PARALLELISM`, `SYKLI_CACHE_ROOT`,
/// `SYKLI_HISTORY_ROOT`, `SYKLI_TARGET`, `SYKLI_TIMEOUT_SECONDS`.
pub fn apply_env_overrides(config: &mut EngineConfig) {
    if let Ok(val) = std::env::var("SYKLI_PARALLELISM") {
        if let Ok(n) = val.parse() {
            config.parallelism = Some(n);
        }
    }
    if let Ok(val) = std::env::var("SYKLI_CACHE_ROOT") {
        config.cache_root = Some(val);
    }
    if let Ok(val) = std::env::var("SYKLI_HISTORY_ROOT") {
        config.history_root = Some(val);
    }
    if let Ok(val) = std::env::var("SYKLI_TARGET") {
        config.default_target = Some(val);
    }
    if let Ok(val) = std::env::var("SYKLI_TIMEOUT_SECONDS") {
        if let Ok(n) = val.parse() {
            config.global_timeout_seconds = Some(n);
        }
    }
}
