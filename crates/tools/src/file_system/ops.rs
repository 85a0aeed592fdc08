use super::backup::copy_dir;
use super::glob::matches_entry;
use super::operation::{FsOperation, HashAlgorithm};
use super::{FileSystemTool, Targets};
use crate::error::ToolError;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use toolwarden_policy::{DenyReason, PolicyViolation};
use tracing::debug;
use uuid::Uuid;

const HASH_CHUNK: usize = 8192;

impl FileSystemTool {
    pub(crate) async fn perform(&self, op: FsOperation, targets: Targets) -> Result<Value, ToolError> {
        debug!(operation = op.name(), "file_system operation");
        let Targets { path, destination } = targets;

        match op {
            FsOperation::Read { encoding, .. } => self.read(&required(path)?, &encoding).await,
            FsOperation::Write { content, encoding, .. } => {
                self.write(&required(path)?, &content, &encoding).await
            }
            FsOperation::Copy { .. } => self.copy(&required(path)?, &required(destination)?).await,
            FsOperation::Move { .. } => self.move_item(&required(path)?, &required(destination)?).await,
            FsOperation::Delete { .. } => self.delete(&required(path)?).await,
            FsOperation::List { recursive, .. } => self.list(&required(path)?, recursive).await,
            FsOperation::Search { pattern, recursive, .. } => {
                self.search(&required(path)?, &pattern, recursive).await
            }
            FsOperation::Info { .. } => self.info(&required(path)?).await,
            FsOperation::Mkdir { .. } => self.mkdir(&required(path)?).await,
            FsOperation::Watch { .. } => self.watch(&required(path)?).await,
            FsOperation::StopWatch { .. } => Ok(self.stop_watch()),
            FsOperation::Backup { .. } => self.backup(&required(path)?).await,
            FsOperation::Restore { backup_name, .. } => {
                self.restore(&required(path)?, backup_name.as_deref()).await
            }
            FsOperation::Hash { algorithm, .. } => self.hash(&required(path)?, algorithm).await,
            FsOperation::Permissions { permissions, .. } => {
                self.permissions(&required(path)?, permissions.as_deref()).await
            }
        }
    }

    async fn read(&self, path: &Path, encoding: &str) -> Result<Value, ToolError> {
        let meta = existing(path, "File").await?;
        if !meta.is_file() {
            return Err(ToolError::Execution(format!("Path is not a file: {}", path.display())));
        }
        if meta.len() > self.config.max_file_size {
            return Err(ToolError::Execution(format!(
                "File too large: {} bytes > {}",
                meta.len(),
                self.config.max_file_size
            )));
        }

        let codec = lookup_encoding(encoding)?;
        let bytes = fs::read(path).await?;
        let mut out = json!({
            "size": meta.len(),
            "mime_type": mime_type(path),
            "last_modified": meta.modified().ok().map(iso),
        });

        match codec.decode_without_bom_handling_and_without_replacement(&bytes) {
            Some(text) => {
                out["content"] = Value::String(text.into_owned());
                out["encoding"] = Value::String(encoding.to_string());
            }
            None => {
                out["content"] = Value::String(hex::encode(&bytes));
                out["encoding"] = Value::String("binary".into());
                out["note"] = Value::String("Binary content returned as hex string".into());
            }
        }
        Ok(out)
    }

    async fn write(&self, path: &Path, content: &str, encoding: &str) -> Result<Value, ToolError> {
        let codec = lookup_encoding(encoding)?;
        let bytes = encode_text(codec, content, encoding)?;

        let existed = match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(ToolError::Execution(format!("Path is a directory: {}", path.display())))
            }
            Ok(_) => true,
            Err(_) => false,
        };

        let backup_path = if existed && self.config.enable_backup {
            Some(self.backups.create(path).await?)
        } else {
            None
        };

        if let Some(parent) = path.parent() {
            self.create_dirs_within_roots(parent).await?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ToolError::Validation(format!("Path has no file name: {}", path.display())))?;
        let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(json!({
            "path": path.display().to_string(),
            "size": bytes.len(),
            "encoding": encoding,
            "created": !existed,
            "backup_path": backup_path.map(|p| p.display().to_string()),
            "timestamp": now(),
        }))
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<Value, ToolError> {
        let meta = existing(src, "Source").await?;
        let operation = if meta.is_file() {
            if let Some(parent) = dst.parent() {
                self.create_dirs_within_roots(parent).await?;
            }
            fs::copy(src, dst).await?;
            "file_copy"
        } else {
            if dst.starts_with(src) {
                return Err(ToolError::Validation("Cannot copy a directory into itself".into()));
            }
            if let Some(parent) = dst.parent() {
                self.create_dirs_within_roots(parent).await?;
            }
            copy_dir(src, dst, self.config.max_directory_depth).await?;
            "directory_copy"
        };

        Ok(json!({
            "operation": operation,
            "source": src.display().to_string(),
            "destination": dst.display().to_string(),
            "timestamp": now(),
        }))
    }

    async fn move_item(&self, src: &Path, dst: &Path) -> Result<Value, ToolError> {
        let meta = existing(src, "Source").await?;
        if meta.is_dir() && dst.starts_with(src) {
            return Err(ToolError::Validation("Cannot move a directory into itself".into()));
        }
        if let Some(parent) = dst.parent() {
            self.create_dirs_within_roots(parent).await?;
        }

        if fs::rename(src, dst).await.is_err() {
            // Different filesystems: copy then remove.
            if meta.is_dir() {
                copy_dir(src, dst, self.config.max_directory_depth).await?;
                fs::remove_dir_all(src).await?;
            } else {
                fs::copy(src, dst).await?;
                fs::remove_file(src).await?;
            }
        }

        Ok(json!({
            "operation": "move",
            "source": src.display().to_string(),
            "destination": dst.display().to_string(),
            "timestamp": now(),
        }))
    }

    async fn delete(&self, path: &Path) -> Result<Value, ToolError> {
        let meta = existing(path, "Item").await?;
        if self.config.tool.safe_mode && self.policy.is_root(path) {
            return Err(ToolError::Validation(format!(
                "Refusing to delete an allowed root: {}",
                path.display()
            )));
        }

        let backup_path = if self.config.enable_backup {
            Some(self.backups.create(path).await?)
        } else {
            None
        };

        let operation = if meta.is_dir() {
            fs::remove_dir_all(path).await?;
            "directory_delete"
        } else {
            fs::remove_file(path).await?;
            "file_delete"
        };

        Ok(json!({
            "operation": operation,
            "path": path.display().to_string(),
            "backup_path": backup_path.map(|p| p.display().to_string()),
            "timestamp": now(),
        }))
    }

    async fn list(&self, path: &Path, recursive: bool) -> Result<Value, ToolError> {
        let meta = existing(path, "Directory").await?;
        if !meta.is_dir() {
            return Err(ToolError::Execution(format!("Path is not a directory: {}", path.display())));
        }

        let depth = if recursive { self.config.max_directory_depth } else { 0 };
        let (entries, truncated) = walk(path, depth).await?;
        let items: Vec<Value> = entries
            .iter()
            .map(|(p, m)| {
                json!({
                    "name": p.file_name().map(|n| n.to_string_lossy().to_string()),
                    "path": p.display().to_string(),
                    "type": if m.is_dir() { "directory" } else { "file" },
                    "size": if m.is_file() { Some(m.len()) } else { None },
                    "modified": m.modified().ok().map(iso),
                    "permissions": mode_string(m),
                })
            })
            .collect();

        Ok(json!({
            "directory": path.display().to_string(),
            "count": items.len(),
            "items": items,
            "recursive": recursive,
            "truncated": truncated,
        }))
    }

    async fn search(&self, path: &Path, pattern: &str, recursive: bool) -> Result<Value, ToolError> {
        let meta = existing(path, "Search path").await?;
        if !meta.is_dir() {
            return Err(ToolError::Execution(format!("Path is not a directory: {}", path.display())));
        }

        let depth = if recursive { self.config.max_directory_depth } else { 0 };
        let (entries, truncated) = walk(path, depth).await?;
        let matches: Vec<Value> = entries
            .iter()
            .filter(|(_, m)| m.is_file())
            .filter(|(p, _)| {
                let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                let relative = p
                    .strip_prefix(path)
                    .map(|r| {
                        r.components()
                            .map(|c| c.as_os_str().to_string_lossy().to_string())
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .unwrap_or_default();
                matches_entry(pattern, &name, &relative)
            })
            .map(|(p, m)| {
                json!({
                    "path": p.display().to_string(),
                    "name": p.file_name().map(|n| n.to_string_lossy().to_string()),
                    "size": m.len(),
                    "modified": m.modified().ok().map(iso),
                    "permissions": mode_string(m),
                })
            })
            .collect();

        Ok(json!({
            "search_path": path.display().to_string(),
            "pattern": pattern,
            "count": matches.len(),
            "matches": matches,
            "recursive": recursive,
            "truncated": truncated,
        }))
    }

    async fn info(&self, path: &Path) -> Result<Value, ToolError> {
        let meta = existing(path, "Item").await?;
        let mode = mode_bits(&meta);
        let mut info = json!({
            "path": path.display().to_string(),
            "name": path.file_name().map(|n| n.to_string_lossy().to_string()),
            "type": if meta.is_dir() { "directory" } else { "file" },
            "size": meta.len(),
            "created": meta.created().ok().map(iso),
            "modified": meta.modified().ok().map(iso),
            "accessed": meta.accessed().ok().map(iso),
            "permissions": mode_string(&meta),
            "owner_readable": mode & 0o400 != 0,
            "owner_writable": mode & 0o200 != 0,
            "owner_executable": mode & 0o100 != 0,
        });
        if meta.is_file() {
            info["mime_type"] = json!(mime_type(path));
            info["extension"] = json!(path.extension().map(|e| format!(".{}", e.to_string_lossy())));
        }
        Ok(info)
    }

    async fn mkdir(&self, path: &Path) -> Result<Value, ToolError> {
        let existed = fs::try_exists(path).await.unwrap_or(false);
        self.create_dirs_within_roots(path).await?;
        Ok(json!({
            "operation": "mkdir",
            "path": path.display().to_string(),
            "created": !existed,
            "timestamp": now(),
        }))
    }

    async fn watch(&self, path: &Path) -> Result<Value, ToolError> {
        let meta = existing(path, "Watch path").await?;
        if !meta.is_dir() {
            return Err(ToolError::Execution(format!(
                "Watch path must be an existing directory: {}",
                path.display()
            )));
        }
        self.watcher.start(path)?;
        Ok(json!({
            "operation": "start_watch",
            "path": path.display().to_string(),
            "status": "watching",
            "timestamp": now(),
        }))
    }

    fn stop_watch(&self) -> Value {
        match self.watcher.stop() {
            Some((root, changes)) => json!({
                "operation": "stop_watch",
                "status": "stopped",
                "path": root.display().to_string(),
                "changes_detected": changes.len(),
                "changes": changes,
                "timestamp": now(),
            }),
            None => json!({
                "operation": "stop_watch",
                "status": "not_watching",
                "message": "File watcher was not active",
            }),
        }
    }

    async fn backup(&self, path: &Path) -> Result<Value, ToolError> {
        let meta = existing(path, "Backup source").await?;
        let backup_path = self.backups.create(path).await?;
        Ok(json!({
            "operation": if meta.is_dir() { "directory_backup" } else { "file_backup" },
            "source": path.display().to_string(),
            "backup_path": backup_path.display().to_string(),
            "timestamp": now(),
        }))
    }

    async fn restore(&self, path: &Path, backup_name: Option<&str>) -> Result<Value, ToolError> {
        let backup = self.backups.locate(path, backup_name).await?;
        if let Some(parent) = path.parent() {
            self.create_dirs_within_roots(parent).await?;
        }
        let operation = self.backups.restore(&backup, path).await?;
        Ok(json!({
            "operation": operation,
            "restored_path": path.display().to_string(),
            "backup_used": backup.display().to_string(),
            "timestamp": now(),
        }))
    }

    async fn hash(&self, path: &Path, algorithm: HashAlgorithm) -> Result<Value, ToolError> {
        let meta = existing(path, "File").await?;
        if !meta.is_file() {
            return Err(ToolError::Execution(format!("Path is not a file: {}", path.display())));
        }

        let digest = match algorithm {
            HashAlgorithm::Sha256 => stream_digest::<Sha256>(path).await?,
            HashAlgorithm::Sha224 => stream_digest::<Sha224>(path).await?,
            HashAlgorithm::Sha384 => stream_digest::<Sha384>(path).await?,
            HashAlgorithm::Sha512 => stream_digest::<Sha512>(path).await?,
        };

        Ok(json!({
            "path": path.display().to_string(),
            "algorithm": algorithm.as_str(),
            "hash": digest,
            "file_size": meta.len(),
            "timestamp": now(),
        }))
    }

    async fn permissions(&self, path: &Path, requested: Option<&str>) -> Result<Value, ToolError> {
        let meta = existing(path, "Item").await?;
        let mode = mode_bits(&meta);
        let mut out = json!({
            "path": path.display().to_string(),
            "current_permissions": mode_string(&meta),
            "readable": mode & 0o400 != 0,
            "writable": mode & 0o200 != 0,
            "executable": mode & 0o100 != 0,
        });

        let Some(requested) = requested else {
            out["operation"] = json!("permissions_read");
            return Ok(out);
        };

        let new_mode = u32::from_str_radix(requested.trim(), 8)
            .ok()
            .filter(|m| *m <= 0o7777)
            .ok_or_else(|| ToolError::Validation(format!("Invalid octal permissions: {}", requested)))?;
        if self.config.tool.safe_mode && new_mode & 0o7000 != 0 {
            return Err(ToolError::Validation(
                "setuid, setgid and sticky bits are refused in safe mode".into(),
            ));
        }

        set_mode(path, new_mode).await?;
        out["operation"] = json!("permissions_changed");
        out["new_permissions"] = json!(format!("{:03o}", new_mode));
        Ok(out)
    }

    /// `create_dir_all`, except every directory that does not exist yet must
    /// itself lie inside an allowed root.
    async fn create_dirs_within_roots(&self, dir: &Path) -> Result<(), ToolError> {
        let mut cursor = Some(dir);
        while let Some(current) = cursor {
            if fs::try_exists(current).await.unwrap_or(false) {
                break;
            }
            // A configured root may be created along with its parents.
            if self.policy.is_root(current) {
                break;
            }
            if !self.policy.contains(current) {
                return Err(ToolError::SecurityDenied(PolicyViolation::new(
                    DenyReason::OutsideAllowlist,
                    format!("Refusing to create directory outside allowed roots: {}", current.display()),
                )));
            }
            cursor = current.parent();
        }
        fs::create_dir_all(dir).await?;
        Ok(())
    }
}

fn required(path: Option<PathBuf>) -> Result<PathBuf, ToolError> {
    path.ok_or_else(|| ToolError::Validation("Path is required".into()))
}

async fn existing(path: &Path, what: &str) -> Result<Metadata, ToolError> {
    fs::metadata(path)
        .await
        .map_err(|_| ToolError::Execution(format!("{} not found: {}", what, path.display())))
}

fn lookup_encoding(label: &str) -> Result<&'static encoding_rs::Encoding, ToolError> {
    encoding_rs::Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ToolError::Validation(format!("Unsupported encoding: {}", label)))
}

/// encoding_rs only encodes to output encodings, which map UTF-16 to UTF-8,
/// so UTF-16 is serialized by hand and the other non-writable labels
/// (such as `replacement`) are refused.
fn encode_text(
    codec: &'static encoding_rs::Encoding,
    content: &str,
    label: &str,
) -> Result<Vec<u8>, ToolError> {
    if codec == encoding_rs::UTF_16LE {
        return Ok(content.encode_utf16().flat_map(u16::to_le_bytes).collect());
    }
    if codec == encoding_rs::UTF_16BE {
        return Ok(content.encode_utf16().flat_map(u16::to_be_bytes).collect());
    }
    if codec.output_encoding() != codec {
        return Err(ToolError::Validation(format!("Cannot write with encoding: {}", label)));
    }
    let (bytes, _, had_errors) = codec.encode(content);
    if had_errors {
        return Err(ToolError::Validation(format!(
            "Content cannot be represented in {}",
            label
        )));
    }
    Ok(bytes.into_owned())
}

/// Entries below `root` up to `max_depth` levels deep (0 lists only the
/// direct children), sorted by path. The flag reports skipped deeper levels.
async fn walk(root: &Path, max_depth: usize) -> Result<(Vec<(PathBuf, Metadata)>, bool), ToolError> {
    let mut out = Vec::new();
    let mut truncated = false;
    let mut stack = vec![(root.to_path_buf(), 0usize)];

    while let Some((dir, depth)) = stack.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if meta.is_dir() {
                if depth < max_depth {
                    stack.push((entry.path(), depth + 1));
                } else if max_depth > 0 {
                    truncated = true;
                }
            }
            out.push((entry.path(), meta));
        }
    }

    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok((out, truncated))
}

async fn stream_digest<D: Digest>(path: &Path) -> Result<String, ToolError> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

fn mode_string(meta: &Metadata) -> String {
    format!("{:03o}", mode_bits(meta) & 0o777)
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), ToolError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), ToolError> {
    Err(ToolError::Execution("Setting permissions is only supported on Unix".into()))
}

fn iso(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).to_rfc3339()
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "yml" | "yaml" => "application/yaml",
        "py" => "text/x-python",
        "js" => "text/javascript",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "sql" => "application/sql",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(mime)
}
