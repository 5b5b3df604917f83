// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal SDK invocation surface.
//!
//! The SDKs that produce the JSON task graph are out of scope, but the
//! engine still has to find and run one to get that JSON in the first
//! place. This module owns exactly that: locating the pipeline file in a
//! project root and spawning the right interpreter for it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::CoreError;

/// The language-specific pipeline entry point found in a project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineFile {
    Go(PathBuf),
    Rust(PathBuf),
    TypeScript(PathBuf),
    Python(PathBuf),
    Elixir(PathBuf),
}

impl PipelineFile {
    pub fn path(&self) -> &Path {
        match self {
            PipelineFile::Go(p)
            | PipelineFile::Rust(p)
            | PipelineFile::TypeScript(p)
            | PipelineFile::Python(p)
            | PipelineFile::Elixir(p) => p,
        }
    }
}

/// Look for a supported pipeline entry point in `root`, in the precedence
/// order the spec names: `sykli.go`, a Cargo project with a `sykli` binary
/// target, `sykli.ts`, `sykli.py`, `sykli.exs`.
pub fn detect_pipeline_file(root: &Path) -> Result<PipelineFile, CoreError> {
    let go = root.join("sykli.go");
    if go.is_file() {
        return Ok(PipelineFile::Go(go));
    }

    let cargo_toml = root.join("Cargo.toml");
    if cargo_toml.is_file() {
        if let Ok(contents) = std::fs::read_to_string(&cargo_toml) {
            if contents.contains("name = \"sykli\"") && contents.contains("[[bin]]") {
                return Ok(PipelineFile::Rust(cargo_toml));
            }
        }
    }

    let ts = root.join("sykli.ts");
    if ts.is_file() {
        return Ok(PipelineFile::TypeScript(ts));
    }

    let py = root.join("sykli.py");
    if py.is_file() {
        return Ok(PipelineFile::Python(py));
    }

    let exs = root.join("sykli.exs");
    if exs.is_file() {
        return Ok(PipelineFile::Elixir(exs));
    }

    Err(CoreError::NoPipelineFile(root.display().to_string()))
}

/// Invoke the interpreter appropriate for `pipeline` with `--emit` and
/// return the raw stdout bytes, with any non-JSON leading lines (a warning
/// convention some SDKs print to stdout before the graph) stripped.
pub async fn invoke_sdk(pipeline: &PipelineFile, root: &Path) -> Result<Vec<u8>, CoreError> {
    let mut command = build_command(pipeline);
    command
        .current_dir(root)
        .arg("--emit")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(pipeline = ?pipeline.path(), "invoking SDK");
    let output = command
        .output()
        .await
        .map_err(|e| CoreError::Sdk(format!("failed to spawn SDK process: {e}")))?;

    if !output.status.success() {
        warn!(status = %output.status, "SDK process exited non-zero");
        return Err(CoreError::Sdk(format!(
            "SDK exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(strip_leading_non_json(&output.stdout))
}

fn build_command(pipeline: &PipelineFile) -> Command {
    match pipeline {
        PipelineFile::Go(_) => {
            let mut c = Command::new("go");
            c.arg("run").arg("sykli.go");
            c
        }
        PipelineFile::Rust(_) => {
            let mut c = Command::new("cargo");
            c.arg("run").arg("--quiet").arg("--bin").arg("sykli");
            c
        }
        PipelineFile::TypeScript(_) => {
            let mut c = Command::new("npx");
            c.arg("tsx").arg("sykli.ts");
            c
        }
        PipelineFile::Python(_) => {
            let mut c = Command::new("python");
            c.arg("sykli.py");
            c
        }
        PipelineFile::Elixir(_) => {
            let mut c = Command::new("elixir");
            c.arg("sykli.exs");
            c
        }
    }
}

/// Some SDKs print a warning line to stdout before the JSON graph. Find the
/// first line that looks like the start of a JSON object and slice from
/// there.
fn strip_leading_non_json(bytes: &[u8]) -> Vec<u8> {
    if let Some(pos) = bytes.iter().position(|&b| b == b'{') {
        bytes[pos..].to_vec()
    } else {
        bytes.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_go_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sykli.go"), "package main").unwrap();
        let found = detect_pipeline_file(dir.path()).unwrap();
        assert!(matches!(found, PipelineFile::Go(_)));
    }

    #[test]
    fn detects_python_pipeline_when_go_absent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sykli.py"), "").unwrap();
        let found = detect_pipeline_file(dir.path()).unwrap();
        assert!(matches!(found, PipelineFile::Python(_)));
    }

    #[test]
    fn no_pipeline_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = detect_pipeline_file(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::NoPipelineFile(_)));
    }

    #[test]
    fn strips_leading_warning_line() {
        let input = b"warning: using cached build\n{\"version\":\"1\",\"tasks\":[]}";
        let stripped = strip_leading_non_json(input);
        assert_eq!(stripped, b"{\"version\":\"1\",\"tasks\":[]}");
    }
}
