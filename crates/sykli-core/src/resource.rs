// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resources referenced by task mounts.

use serde::{Deserialize, Serialize};

/// A named resource a task may mount into its workdir or container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
    Directory { path: String },
    Cache { name: String },
}
