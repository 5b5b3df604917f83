// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gate configuration and the misconfiguration checks done before a gate
//! ever enters `waiting` (§4.8).

use serde::{Deserialize, Serialize};

use crate::error::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStrategy {
    Prompt,
    Env,
    File,
    Webhook,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    pub strategy: Option<GateStrategy>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Default gate wait, used when a task omits `timeout_seconds`.
const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

impl GateConfig {
    pub fn strategy(&self) -> Result<GateStrategy, GateError> {
        self.strategy.ok_or_else(|| GateError::Configuration("gate.strategy is required".to_string()))
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    /// Reject misconfiguration up front: an `env` gate with no `env_var`,
    /// or a `file` gate with no `file_path`, is a configuration error, not
    /// something that should sit in `waiting` forever.
    pub fn validate(&self) -> Result<(), GateError> {
        match self.strategy()? {
            GateStrategy::Env => {
                if self.env_var.as_deref().unwrap_or("").is_empty() {
                    return Err(GateError::Configuration("env gate requires a non-empty env_var".to_string()));
                }
            }
            GateStrategy::File => {
                if self.file_path.as_deref().unwrap_or("").is_empty() {
                    return Err(GateError::Configuration("file gate requires a non-empty file_path".to_string()));
                }
            }
            GateStrategy::Prompt | GateStrategy::Webhook => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_gate_without_env_var_is_rejected() {
        let cfg = GateConfig { strategy: Some(GateStrategy::Env), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(GateError::Configuration(_))));
    }

    #[test]
    fn file_gate_without_file_path_is_rejected() {
        let cfg = GateConfig { strategy: Some(GateStrategy::File), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(GateError::Configuration(_))));
    }

    #[test]
    fn prompt_gate_needs_no_extra_fields() {
        let cfg = GateConfig { strategy: Some(GateStrategy::Prompt), ..Default::default() };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_strategy_is_rejected() {
        let cfg = GateConfig::default();
        assert!(matches!(cfg.validate(), Err(GateError::Configuration(_))));
    }

    #[test]
    fn default_timeout_applies_when_unset() {
        let cfg = GateConfig { strategy: Some(GateStrategy::Prompt), ..Default::default() };
        assert_eq!(cfg.timeout().as_secs(), DEFAULT_TIMEOUT_SECONDS);
    }
}
