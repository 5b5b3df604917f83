// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content-addressed cache: fingerprinting, blob store, and garbage
//! collection (§4.3).

pub mod entry;
pub mod error;
pub mod fingerprint;
pub mod store;

pub use entry::{CacheEntry, OutputRecord};
pub use error::{CacheError, MissReason};
pub use fingerprint::{compute_fingerprint, hash_env, hash_inputs, hash_mounts, MountView};
pub use store::{classify_change, now_unix_seconds, Cache, CacheStats, CleanReport};
