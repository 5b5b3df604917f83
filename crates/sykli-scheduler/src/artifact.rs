// SPDX-License-Identifier: MIT OR Apache-2.0
//! Artifact staging (§4.2 step 4): copies a task's `task_inputs` from their
//! producer's declared output path into the consumer's workdir, rejecting
//! any destination that would escape it.

use std::path::{Path, PathBuf};

use sykli_core::{Graph, Task};

use crate::error::SchedulerError;

/// Lexically resolve `relative` against `workdir`, rejecting absolute paths
/// and any `..` that would climb above `workdir` itself. This is a purely
/// lexical check (the destination may not exist yet, so `canonicalize`
/// can't be used) but it is sufficient: every `..` segment must be matched
/// by a preceding real segment within the same relative path.
fn resolve_within(workdir: &Path, relative: &str) -> Option<PathBuf> {
    if Path::new(relative).is_absolute() {
        return None;
    }
    let mut stack: Vec<&str> = Vec::new();
    for component in relative.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => {
                stack.pop()?;
            }
            other => stack.push(other),
        }
    }
    let mut resolved = workdir.to_path_buf();
    resolved.extend(stack);
    Some(resolved)
}

/// Stage every `task_inputs` entry for `task`. Producer tasks are assumed to
/// already have run (or been restored from cache) in this same `workdir`,
/// so their declared output paths are already present on disk.
pub fn stage_task_inputs(workdir: &Path, task: &Task, graph: &Graph) -> Result<(), SchedulerError> {
    for input_ref in &task.task_inputs {
        let producer = graph
            .task(&input_ref.from_task)
            .expect("graph.build() validates task_inputs producers exist");
        let output_path = producer
            .outputs
            .get(&input_ref.output_name)
            .expect("graph.build() validates the producer declares this output");

        let src = workdir.join(output_path);
        let dest = resolve_within(workdir, &input_ref.dest_path).ok_or_else(|| SchedulerError::PathTraversal {
            task: task.name.clone(),
            dest: input_ref.dest_path.clone(),
        })?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&src, &dest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use sykli_core::TaskInputRef;

    #[test]
    fn resolves_plain_relative_path() {
        let resolved = resolve_within(Path::new("/work"), "out/bin").unwrap();
        assert_eq!(resolved, PathBuf::from("/work/out/bin"));
    }

    #[test]
    fn rejects_absolute_destination() {
        assert!(resolve_within(Path::new("/work"), "/etc/passwd").is_none());
    }

    #[test]
    fn rejects_traversal_above_workdir() {
        assert!(resolve_within(Path::new("/work"), "../../etc/passwd").is_none());
    }

    #[test]
    fn allows_traversal_that_stays_within_workdir() {
        let resolved = resolve_within(Path::new("/work"), "a/../b").unwrap();
        assert_eq!(resolved, PathBuf::from("/work/b"));
    }

    fn bare_task(name: &str) -> Task {
        Task {
            name: name.to_string(),
            command: Some("true".to_string()),
            container: None,
            workdir: None,
            env: BTreeMap::new(),
            timeout_seconds: None,
            retry: 0,
            inputs: Vec::new(),
            outputs: BTreeMap::new(),
            task_inputs: Vec::new(),
            depends_on: BTreeSet::new(),
            condition: None,
            mounts: Vec::new(),
            services: Vec::new(),
            matrix: Default::default(),
            matrix_values: Default::default(),
            secrets: Vec::new(),
            secret_refs: Vec::new(),
            requires: Vec::new(),
            target: None,
            k8s: None,
            semantic: None,
            ai_hooks: None,
            capability: None,
            gate: None,
            credential_binding: None,
            verify: None,
            history_hint: None,
        }
    }

    #[test]
    fn stages_a_producers_output_into_the_consumer_dest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.bin"), b"binary").unwrap();

        let mut producer = bare_task("build");
        producer.outputs.insert("binary".to_string(), "app.bin".to_string());
        let mut consumer = bare_task("test");
        consumer.depends_on.insert("build".to_string());
        consumer.task_inputs.push(TaskInputRef {
            from_task: "build".to_string(),
            output_name: "binary".to_string(),
            dest_path: "staged/app.bin".to_string(),
        });

        let mut tasks = BTreeMap::new();
        tasks.insert("build".to_string(), producer);
        tasks.insert("test".to_string(), consumer.clone());
        let graph = Graph::new(tasks, BTreeMap::new());

        stage_task_inputs(dir.path(), &consumer, &graph).unwrap();
        let staged = std::fs::read(dir.path().join("staged/app.bin")).unwrap();
        assert_eq!(staged, b"binary");
    }

    #[test]
    fn rejects_a_traversing_dest_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.bin"), b"binary").unwrap();

        let mut producer = bare_task("build");
        producer.outputs.insert("binary".to_string(), "app.bin".to_string());
        let mut consumer = bare_task("test");
        consumer.depends_on.insert("build".to_string());
        consumer.task_inputs.push(TaskInputRef {
            from_task: "build".to_string(),
            output_name: "binary".to_string(),
            dest_path: "../escaped.bin".to_string(),
        });

        let mut tasks = BTreeMap::new();
        tasks.insert("build".to_string(), producer);
        tasks.insert("test".to_string(), consumer.clone());
        let graph = Graph::new(tasks, BTreeMap::new());

        let err = stage_task_inputs(dir.path(), &consumer, &graph).unwrap_err();
        assert!(matches!(err, SchedulerError::PathTraversal { .. }));
    }
}
