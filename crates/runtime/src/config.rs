//! Runtime configuration loader.

use crate::interfaces::RuntimeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use toolwarden_tools::{FileSystemConfig, WebSearchConfig};

/// OpenAI-compatible completion endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_retries: 2,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_iterations: usize,
    pub allowed_tools: Vec<String>,
    pub inject_system_prompt: bool,
    pub session_max_age_hours: u64,
    pub active_session_window_secs: u64,
    pub file_system: FileSystemConfig,
    pub web_search: WebSearchConfig,
    pub completion: CompletionConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            allowed_tools: vec!["file_system".to_string(), "web_search".to_string()],
            inject_system_prompt: true,
            session_max_age_hours: 24,
            active_session_window_secs: 3600,
            file_system: FileSystemConfig::default(),
            web_search: WebSearchConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_hours.saturating_mul(3600))
    }

    pub fn active_session_window(&self) -> Duration {
        Duration::from_secs(self.active_session_window_secs)
    }

    fn validate(&self) -> Result<(), RuntimeError> {
        if self.max_iterations == 0 {
            return Err(RuntimeError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.completion.base_url.trim().is_empty() {
            return Err(RuntimeError::Config(
                "completion.base_url cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a YAML document into a [`RuntimeConfig`]. Missing fields take their
/// defaults; an empty document is rejected.
pub fn parse_runtime_config(content: &str) -> Result<RuntimeConfig, RuntimeError> {
    if content.trim().is_empty() {
        return Err(RuntimeError::Config("Config file is empty".to_string()));
    }
    let config: RuntimeConfig = serde_yaml::from_str(content)
        .map_err(|e| RuntimeError::Config(format!("Invalid YAML: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Load runtime configuration from a YAML file.
///
/// # Errors
/// Returns error if the file is missing, empty or invalid.
pub fn load_runtime_config(config_path: impl AsRef<Path>) -> Result<RuntimeConfig, RuntimeError> {
    let config_file = config_path.as_ref();

    if !config_file.exists() {
        return Err(RuntimeError::Config(format!(
            "Config file not found: {}",
            config_file.display()
        )));
    }

    let content = std::fs::read_to_string(config_file)?;
    parse_runtime_config(&content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_valid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("toolwarden.yaml");
        fs::write(
            &config_file,
            "max_iterations: 3\n\
             allowed_tools:\n  - file_system\n\
             file_system:\n  allowed_paths: [workspace]\n  max_execution_time_ms: 500\n  enable_backup: false\n\
             web_search:\n  blocked_domains: [evil.example]\n\
             completion:\n  model: local-model\n",
        )
        .unwrap();

        let config = load_runtime_config(&config_file).unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.allowed_tools, vec!["file_system"]);
        assert_eq!(config.file_system.tool.max_execution_time_ms, 500);
        assert!(!config.file_system.enable_backup);
        assert_eq!(config.file_system.max_directory_depth, 10);
        assert_eq!(config.web_search.blocked_domains, vec!["evil.example"]);
        assert_eq!(config.completion.model, "local-model");
        assert_eq!(config.completion.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_empty_mapping_uses_defaults() {
        let config = parse_runtime_config("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.session_max_age(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_empty_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("empty.yaml");
        fs::write(&config_file, "  \n").unwrap();

        match load_runtime_config(&config_file) {
            Err(RuntimeError::Config(msg)) => assert!(msg.contains("empty")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let result = load_runtime_config("/nonexistent/toolwarden.yaml");
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = parse_runtime_config("max_iterations: [not, a, number]");
        assert!(matches!(result, Err(RuntimeError::Config(msg)) if msg.contains("Invalid YAML")));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(parse_runtime_config("max_iterations: 0").is_err());
    }
}
