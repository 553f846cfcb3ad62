use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ArborError, Result};
use crate::types::TraversalStrategy;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Keep running remaining nodes after a node fails (default: false).
    #[serde(default)]
    pub continue_on_error: bool,
    /// Overrides the tree's own default traversal when set.
    #[serde(default)]
    pub default_traversal: Option<TraversalStrategy>,
    /// Depth limit for traversal and subtree extraction.
    #[serde(default)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on nodes dispatched together by the graph executor.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

pub const DEFAULT_MAX_PARALLEL: usize = 5;

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "arbor=info,warn".to_string()
}

impl EngineConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ArborError::ConfigNotFound(path.display().to_string()))?;

        Self::from_toml(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn from_toml(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| ArborError::Config(e.to_string()))?;
        if config.scheduler.max_parallel == 0 {
            return Err(ArborError::Config(
                "scheduler.max_parallel must be at least 1".into(),
            ));
        }
        Ok(config)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert!(!config.executor.continue_on_error);
        assert_eq!(config.executor.default_traversal, None);
        assert_eq!(config.scheduler.max_parallel, DEFAULT_MAX_PARALLEL);
        assert_eq!(config.log.filter, "arbor=info,warn");
    }

    #[test]
    fn test_zero_max_parallel_rejected() {
        let err = EngineConfig::from_toml("[scheduler]\nmax_parallel = 0\n").unwrap_err();
        assert!(matches!(err, ArborError::Config(_)));
    }

    #[test]
    fn test_unset_env_var_kept_verbatim() {
        let out = expand_env_vars("x = \"${ARBOR_SURELY_UNSET_VAR}\"");
        assert_eq!(out, "x = \"${ARBOR_SURELY_UNSET_VAR}\"");
    }
}
