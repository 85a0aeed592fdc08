//! Policy-governed filesystem tool.
//!
//! Every path argument is resolved and checked by a [`PathPolicy`] before any
//! storage is touched. The allowlist is shared through [`AllowedPaths`] so an
//! administrator's change applies to the very next call.

mod backup;
mod config;
mod glob;
mod operation;
mod ops;
mod watcher;

pub use backup::BackupStore;
pub use config::FileSystemConfig;
pub use glob::{glob_match, matches_entry};
pub use operation::{FsOperation, HashAlgorithm};
pub use watcher::{ChangeEvent, ChangeType, FileWatcher};

use crate::config::ToolConfig;
use crate::error::ToolError;
use crate::traits::Tool;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use toolwarden_policy::{AllowedPaths, DenyReason, PathAccess, PathPolicy, PolicyViolation};
use tracing::info;

pub struct FileSystemTool {
    config: FileSystemConfig,
    policy: PathPolicy,
    backups: BackupStore,
    watcher: FileWatcher,
}

/// Canonical paths an operation is allowed to touch.
#[derive(Debug, Default)]
pub(crate) struct Targets {
    pub path: Option<PathBuf>,
    pub destination: Option<PathBuf>,
}

impl FileSystemTool {
    /// Relative paths resolve against the process working directory.
    pub fn new(config: FileSystemConfig) -> Result<Self, ToolError> {
        let base_dir = std::env::current_dir()?;
        Ok(Self::with_base_dir(config, base_dir))
    }

    pub fn with_base_dir(config: FileSystemConfig, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let policy = PathPolicy::new(&base_dir)
            .with_allowed_roots(config.allowed_paths.clone())
            .with_allowed_extensions(&config.allowed_extensions)
            .with_blocked_extensions(&config.blocked_extensions)
            .with_blocked_patterns(config.blocked_patterns.clone());

        let backup_dir = if config.backup_directory.is_absolute() {
            config.backup_directory.clone()
        } else {
            base_dir.join(&config.backup_directory)
        };
        let backups = BackupStore::new(backup_dir, config.max_directory_depth);

        info!(
            roots = config.allowed_paths.len(),
            backups = config.enable_backup,
            "FileSystemTool initialized"
        );

        Self {
            config,
            policy,
            backups,
            watcher: FileWatcher::new(),
        }
    }

    /// Handle for runtime allowlist administration.
    pub fn allowed_paths(&self) -> AllowedPaths {
        self.policy.allowed_paths().clone()
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    pub fn fs_config(&self) -> &FileSystemConfig {
        &self.config
    }

    pub(crate) fn authorize(&self, op: &FsOperation) -> Result<Targets, PolicyViolation> {
        let check = |raw: &str, access| self.policy.check(raw, access).map(Some);

        let targets = match op {
            FsOperation::Read { path, .. } => Targets {
                path: check(path, PathAccess::Read)?,
                destination: None,
            },
            FsOperation::Write { path, .. } => Targets {
                path: check(path, PathAccess::Write)?,
                destination: None,
            },
            FsOperation::Copy { path, destination } | FsOperation::Move { path, destination } => {
                let source = check(path, PathAccess::Other)?;
                // A file's new name gets the same extension rules as a write.
                let dest_access = match source.as_deref().map(Path::is_dir) {
                    Some(true) => PathAccess::Other,
                    _ => PathAccess::Write,
                };
                Targets {
                    path: source,
                    destination: check(destination, dest_access)?,
                }
            }
            FsOperation::Restore { path, backup_name } => {
                if let Some(name) = backup_name {
                    check_backup_name(name)?;
                }
                Targets {
                    path: check(path, PathAccess::Write)?,
                    destination: None,
                }
            }
            FsOperation::StopWatch { path } => Targets {
                path: match path {
                    Some(p) => check(p, PathAccess::Other)?,
                    None => None,
                },
                destination: None,
            },
            FsOperation::Delete { path }
            | FsOperation::List { path, .. }
            | FsOperation::Search { path, .. }
            | FsOperation::Info { path }
            | FsOperation::Mkdir { path }
            | FsOperation::Watch { path }
            | FsOperation::Backup { path }
            | FsOperation::Hash { path, .. }
            | FsOperation::Permissions { path, .. } => Targets {
                path: check(path, PathAccess::Other)?,
                destination: None,
            },
        };
        Ok(targets)
    }
}

/// A backup name is a bare file name inside the backup directory.
fn check_backup_name(name: &str) -> Result<(), PolicyViolation> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0');
    if plain {
        Ok(())
    } else {
        Err(PolicyViolation::new(
            DenyReason::TraversalDetected,
            format!("Backup name must be a plain file name: {}", name),
        ))
    }
}

#[async_trait]
impl Tool for FileSystemTool {
    fn name(&self) -> &str {
        "file_system"
    }

    fn description(&self) -> &str {
        "File system operations inside the approved directories. Can read, write, copy, move, \
         delete, list and search files, inspect metadata, create directories, watch for changes, \
         back up and restore, hash contents and manage permissions."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": FsOperation::NAMES,
                    "description": "File system operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory path (every operation except stop_watch)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write (write)"
                },
                "destination": {
                    "type": "string",
                    "description": "Destination path (copy, move)"
                },
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern (search)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Whether to descend into subdirectories"
                },
                "encoding": {
                    "type": "string",
                    "default": "utf-8",
                    "description": "Text encoding for read and write"
                },
                "backup_name": {
                    "type": "string",
                    "description": "Backup file to restore from; newest when omitted (restore)"
                },
                "algorithm": {
                    "type": "string",
                    "enum": ["sha256", "sha224", "sha384", "sha512"],
                    "description": "Digest algorithm (hash)"
                },
                "permissions": {
                    "type": "string",
                    "description": "New octal mode such as 644 (permissions)"
                }
            },
            "required": ["operation"]
        })
    }

    fn config(&self) -> ToolConfig {
        self.config.tool.clone()
    }

    fn check_security(&self, params: &Value) -> Result<(), PolicyViolation> {
        // Unparseable parameters are reported by `run` as a validation error.
        match FsOperation::parse(params) {
            Ok(op) => self.authorize(&op).map(|_| ()),
            Err(_) => Ok(()),
        }
    }

    async fn run(&self, params: Value) -> Result<Value, ToolError> {
        let op = FsOperation::parse(&params)?;
        let targets = self.authorize(&op)?;
        self.perform(op, targets).await
    }

    async fn shutdown(&self) {
        if let Some((root, events)) = self.watcher.stop() {
            info!(dir = %root.display(), pending = events.len(), "Stopped file watch on shutdown");
        }
    }
}
