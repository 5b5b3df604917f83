// SPDX-License-Identifier: MIT OR Apache-2.0
//! The three self-contained polling strategies: `prompt`, `env`, `file`.
//! `webhook` lives in [`crate::webhook`] since it needs shared registry
//! state rather than a plain poll loop.

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::GateError;

pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    Approved(Option<String>),
    Denied,
    Pending,
}

fn matches_any(value: &str, candidates: &[&str]) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    candidates.contains(&lower.as_str())
}

const APPROVE_VALUES: &[&str] = &["yes", "true", "1", "approve"];
const DENY_VALUES: &[&str] = &["no", "false", "0", "deny"];

pub(crate) fn check_env(var: &str) -> Resolution {
    match std::env::var(var) {
        Ok(value) if matches_any(&value, APPROVE_VALUES) => Resolution::Approved(Some(format!("env:{var}"))),
        Ok(value) if matches_any(&value, DENY_VALUES) => Resolution::Denied,
        _ => Resolution::Pending,
    }
}

pub(crate) fn check_file(path: &str) -> Resolution {
    let deny_path = format!("{path}.deny");
    if Path::new(&deny_path).exists() {
        Resolution::Denied
    } else if Path::new(path).exists() {
        Resolution::Approved(Some(format!("file:{path}")))
    } else {
        Resolution::Pending
    }
}

/// Read a single y/n decision from stdin. Rejects non-TTY stdin up front
/// rather than hanging on a read that will never produce input.
pub(crate) async fn read_prompt_decision(message: Option<&str>, timeout: Duration) -> Result<Resolution, GateError> {
    if !std::io::stdin().is_terminal() {
        return Err(GateError::Configuration("prompt gate requires a TTY".to_string()));
    }
    if let Some(message) = message {
        println!("{message} [y/n]: ");
    }
    let read = async {
        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        reader.read_line(&mut line).await?;
        Ok::<String, std::io::Error>(line)
    };
    match tokio::time::timeout(timeout, read).await {
        Ok(Ok(line)) => {
            let answer = line.trim().to_ascii_lowercase();
            if matches_any(&answer, APPROVE_VALUES) || answer == "y" {
                Ok(Resolution::Approved(Some("prompt".to_string())))
            } else if matches_any(&answer, DENY_VALUES) || answer == "n" {
                Ok(Resolution::Denied)
            } else {
                Ok(Resolution::Pending)
            }
        }
        Ok(Err(e)) => Err(GateError::Io(e)),
        Err(_) => Ok(Resolution::Pending),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_approve_values_are_recognized() {
        std::env::set_var("SYKLI_GATE_TEST_APPROVE", "yes");
        assert_eq!(
            check_env("SYKLI_GATE_TEST_APPROVE"),
            Resolution::Approved(Some("env:SYKLI_GATE_TEST_APPROVE".to_string()))
        );
        std::env::remove_var("SYKLI_GATE_TEST_APPROVE");
    }

    #[test]
    fn env_deny_values_are_recognized() {
        std::env::set_var("SYKLI_GATE_TEST_DENY", "no");
        assert_eq!(check_env("SYKLI_GATE_TEST_DENY"), Resolution::Denied);
        std::env::remove_var("SYKLI_GATE_TEST_DENY");
    }

    #[test]
    fn unset_env_var_is_pending() {
        std::env::remove_var("SYKLI_GATE_TEST_UNSET");
        assert_eq!(check_env("SYKLI_GATE_TEST_UNSET"), Resolution::Pending);
    }

    #[test]
    fn file_presence_approves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approve");
        std::fs::write(&path, "").unwrap();
        assert_eq!(
            check_file(path.to_str().unwrap()),
            Resolution::Approved(Some(format!("file:{}", path.to_str().unwrap())))
        );
    }

    #[test]
    fn sibling_deny_file_takes_priority() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate");
        std::fs::write(&path, "").unwrap();
        std::fs::write(format!("{}.deny", path.to_str().unwrap()), "").unwrap();
        assert_eq!(check_file(path.to_str().unwrap()), Resolution::Denied);
    }

    #[test]
    fn absent_file_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope");
        assert_eq!(check_file(path.to_str().unwrap()), Resolution::Pending);
    }
}
