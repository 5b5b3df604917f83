// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resolves a task's declared [`sykli_core::Mount`]s against the graph's
//! resource table into the backend-facing [`sykli_runtime::MountSpec`]s.

use std::path::{Path, PathBuf};

use sykli_core::{Mount, MountKind, Resource};
use sykli_runtime::MountSpec;

/// Resources that don't resolve are dropped rather than failing the task:
/// the graph builder already guarantees every `resource_id` a task's mounts
/// reference exists, so this only defends against a caller constructing a
/// `Task` by hand (as the test suites below do).
pub fn resolve_mounts(workdir: &Path, mounts: &[Mount], resources: &std::collections::BTreeMap<String, Resource>) -> Vec<MountSpec> {
    mounts
        .iter()
        .filter_map(|mount| resolve_one(workdir, mount, resources))
        .collect()
}

fn resolve_one(workdir: &Path, mount: &Mount, resources: &std::collections::BTreeMap<String, Resource>) -> Option<MountSpec> {
    let resource = resources.get(&mount.resource_id)?;
    match (mount.kind, resource) {
        (MountKind::Directory, Resource::Directory { path }) => {
            let host = if Path::new(path).is_absolute() {
                PathBuf::from(path)
            } else {
                workdir.join(path)
            };
            Some(MountSpec::Directory { host, container: mount.container_path.clone() })
        }
        (MountKind::Cache, Resource::Cache { name }) => {
            Some(MountSpec::Cache { name: name.clone(), container: mount.container_path.clone() })
        }
        _ => None,
    }
}
