use crate::error::ToolError;
use serde::Deserialize;
use serde_json::Value;

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha224,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

/// Every filesystem operation with exactly the arguments it uses.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum FsOperation {
    Read {
        path: String,
        #[serde(default = "default_encoding")]
        encoding: String,
    },
    Write {
        path: String,
        content: String,
        #[serde(default = "default_encoding")]
        encoding: String,
    },
    Copy {
        path: String,
        destination: String,
    },
    Move {
        path: String,
        destination: String,
    },
    Delete {
        path: String,
    },
    List {
        path: String,
        #[serde(default)]
        recursive: bool,
    },
    Search {
        path: String,
        pattern: String,
        #[serde(default = "default_true")]
        recursive: bool,
    },
    Info {
        path: String,
    },
    Mkdir {
        path: String,
    },
    Watch {
        path: String,
    },
    StopWatch {
        #[serde(default)]
        path: Option<String>,
    },
    Backup {
        path: String,
    },
    Restore {
        path: String,
        #[serde(default)]
        backup_name: Option<String>,
    },
    Hash {
        path: String,
        #[serde(default)]
        algorithm: HashAlgorithm,
    },
    Permissions {
        path: String,
        #[serde(default)]
        permissions: Option<String>,
    },
}

impl FsOperation {
    pub fn parse(params: &Value) -> Result<Self, ToolError> {
        serde_json::from_value(params.clone())
            .map_err(|e| ToolError::Validation(format!("Invalid file_system parameters: {}", e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            FsOperation::Read { .. } => "read",
            FsOperation::Write { .. } => "write",
            FsOperation::Copy { .. } => "copy",
            FsOperation::Move { .. } => "move",
            FsOperation::Delete { .. } => "delete",
            FsOperation::List { .. } => "list",
            FsOperation::Search { .. } => "search",
            FsOperation::Info { .. } => "info",
            FsOperation::Mkdir { .. } => "mkdir",
            FsOperation::Watch { .. } => "watch",
            FsOperation::StopWatch { .. } => "stop_watch",
            FsOperation::Backup { .. } => "backup",
            FsOperation::Restore { .. } => "restore",
            FsOperation::Hash { .. } => "hash",
            FsOperation::Permissions { .. } => "permissions",
        }
    }

    pub const NAMES: &'static [&'static str] = &[
        "read",
        "write",
        "copy",
        "move",
        "delete",
        "list",
        "search",
        "info",
        "mkdir",
        "watch",
        "stop_watch",
        "backup",
        "restore",
        "hash",
        "permissions",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_defaults() {
        match FsOperation::parse(&json!({"operation": "read", "path": "a.txt"})).unwrap() {
            FsOperation::Read { path, encoding } => {
                assert_eq!(path, "a.txt");
                assert_eq!(encoding, "utf-8");
            }
            other => panic!("Expected Read, got {:?}", other),
        }

        match FsOperation::parse(&json!({"operation": "search", "path": ".", "pattern": "*.md"})).unwrap() {
            FsOperation::Search { recursive, .. } => assert!(recursive),
            other => panic!("Expected Search, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_hash_algorithm() {
        let op = FsOperation::parse(&json!({"operation": "hash", "path": "a", "algorithm": "sha512"})).unwrap();
        assert!(matches!(op, FsOperation::Hash { algorithm: HashAlgorithm::Sha512, .. }));

        let bad = FsOperation::parse(&json!({"operation": "hash", "path": "a", "algorithm": "md5"}));
        assert!(matches!(bad, Err(ToolError::Validation(_))));
    }

    #[test]
    fn test_write_requires_content() {
        let err = FsOperation::parse(&json!({"operation": "write", "path": "a.txt"}));
        assert!(matches!(err, Err(ToolError::Validation(_))));
    }

    #[test]
    fn test_names_cover_every_variant() {
        for name in FsOperation::NAMES {
            let params = json!({
                "operation": name, "path": "p", "content": "", "destination": "d", "pattern": "*"
            });
            let op = FsOperation::parse(&params).unwrap();
            assert_eq!(op.name(), *name);
        }
    }
}
