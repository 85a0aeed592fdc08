use crate::config::ToolConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    #[serde(flatten)]
    pub tool: ToolConfig,
    /// Roots every path must live under. Relative entries resolve against the
    /// tool's base directory.
    pub allowed_paths: Vec<PathBuf>,
    pub allowed_extensions: Vec<String>,
    pub blocked_extensions: Vec<String>,
    pub blocked_patterns: Vec<String>,
    /// Bytes.
    pub max_file_size: u64,
    pub max_directory_depth: usize,
    pub enable_backup: bool,
    pub backup_directory: PathBuf,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            tool: ToolConfig::default(),
            allowed_paths: vec![PathBuf::from("data/workspace"), PathBuf::from("data/temp")],
            allowed_extensions: [
                ".txt", ".md", ".json", ".csv", ".xml", ".yml", ".yaml", ".py", ".js", ".html",
                ".css", ".sql", ".log",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            blocked_extensions: [".exe", ".bat", ".cmd", ".com", ".scr", ".vbs", ".dll"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocked_patterns: Vec::new(),
            max_file_size: 50 * 1024 * 1024,
            max_directory_depth: 10,
            enable_backup: true,
            backup_directory: PathBuf::from("data/backups"),
        }
    }
}
