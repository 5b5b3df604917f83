// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cache entry and blob output records.

use serde::{Deserialize, Serialize};

/// Metadata for one cached output file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputRecord {
    pub logical_name: String,
    pub relative_path: String,
    pub blob_hash: String,
    pub mode: u32,
    pub size: u64,
}

/// A stored cache entry, keyed externally by its fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub command: Option<String>,
    pub container: Option<String>,
    pub env_hash: String,
    pub mounts_hash: String,
    pub inputs_hash: String,
    pub sykli_version: String,
    pub outputs: Vec<OutputRecord>,
    pub duration_ms: u64,
    pub cached_at: u64,
    pub task_name: String,
}
