use crate::error::ToolError;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Timestamped copies of files and directories, kept in one flat directory.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    max_depth: usize,
}

impl BackupStore {
    pub fn new(dir: PathBuf, max_depth: usize) -> Self {
        Self { dir, max_depth }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` to `<backup_dir>/<name>_<stamp>` and return the new path.
    pub async fn create(&self, source: &Path) -> Result<PathBuf, ToolError> {
        let name = file_name(source)?;
        fs::create_dir_all(&self.dir).await?;

        let mut target = self.dir.join(format!("{}_{}", name, Utc::now().format(STAMP_FORMAT)));
        // Two backups in the same microsecond: wait for the clock instead of
        // producing a name that sorts out of order.
        while fs::try_exists(&target).await.unwrap_or(false) {
            tokio::time::sleep(std::time::Duration::from_micros(1)).await;
            target = self.dir.join(format!("{}_{}", name, Utc::now().format(STAMP_FORMAT)));
        }

        let meta = fs::metadata(source).await?;
        if meta.is_dir() {
            copy_dir(source, &target, self.max_depth).await?;
        } else {
            fs::copy(source, &target).await?;
        }
        tracing::debug!(source = %source.display(), backup = %target.display(), "Created backup");
        Ok(target)
    }

    /// Backup to restore `original` from: the named one, or the newest.
    pub async fn locate(&self, original: &Path, backup_name: Option<&str>) -> Result<PathBuf, ToolError> {
        if let Some(name) = backup_name {
            let candidate = self.dir.join(name);
            if !fs::try_exists(&candidate).await.unwrap_or(false) {
                return Err(ToolError::Execution(format!("Backup not found: {}", name)));
            }
            return Ok(candidate);
        }

        let prefix = format!("{}_", file_name(original)?);
        let mut newest: Option<(String, PathBuf)> = None;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(_) => {
                return Err(ToolError::Execution(format!(
                    "No backups found for: {}",
                    original.display()
                )))
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let entry_name = entry.file_name().to_string_lossy().to_string();
            let Some(stamp) = entry_name.strip_prefix(&prefix) else {
                continue;
            };
            if !is_stamp(stamp) {
                continue;
            }
            if newest.as_ref().map(|(s, _)| stamp > s.as_str()).unwrap_or(true) {
                newest = Some((stamp.to_string(), entry.path()));
            }
        }

        newest
            .map(|(_, path)| path)
            .ok_or_else(|| ToolError::Execution(format!("No backups found for: {}", original.display())))
    }

    /// Copy `backup` over `target`, replacing a directory wholesale.
    pub async fn restore(&self, backup: &Path, target: &Path) -> Result<&'static str, ToolError> {
        let meta = fs::metadata(backup).await?;
        if meta.is_dir() {
            if fs::try_exists(target).await.unwrap_or(false) {
                fs::remove_dir_all(target).await?;
            }
            copy_dir(backup, target, self.max_depth).await?;
            Ok("directory_restore")
        } else {
            fs::copy(backup, target).await?;
            Ok("file_restore")
        }
    }
}

fn file_name(path: &Path) -> Result<String, ToolError> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ToolError::Validation(format!("Path has no file name: {}", path.display())))
}

fn is_stamp(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 22
        && bytes.iter().enumerate().all(|(i, b)| match i {
            8 | 15 => *b == b'_',
            _ => b.is_ascii_digit(),
        })
}

/// Recursive directory copy, refusing trees deeper than `max_depth`.
pub async fn copy_dir(src: &Path, dst: &Path, max_depth: usize) -> Result<(), ToolError> {
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf(), 0usize)];
    while let Some((from, to, depth)) = stack.pop() {
        if depth > max_depth {
            return Err(ToolError::Execution(format!(
                "Directory tree deeper than {} levels: {}",
                max_depth,
                src.display()
            )));
        }
        fs::create_dir_all(&to).await?;
        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let target = to.join(entry.file_name());
            if file_type.is_dir() {
                stack.push((entry.path(), target, depth + 1));
            } else if file_type.is_file() {
                fs::copy(entry.path(), &target).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stamp_shape() {
        assert!(is_stamp("20240131_235959_123456"));
        assert!(!is_stamp("20240131_235959"));
        assert!(!is_stamp("old"));
    }

    #[tokio::test]
    async fn test_newest_backup_selected() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::new(dir.path().join("backups"), 10);
        let file = dir.path().join("notes.txt");

        fs::write(&file, "v1").await.unwrap();
        let first = store.create(&file).await.unwrap();
        fs::write(&file, "v2").await.unwrap();
        let second = store.create(&file).await.unwrap();
        assert_ne!(first, second);

        let chosen = store.locate(&file, None).await.unwrap();
        assert_eq!(chosen, second);
        assert_eq!(fs::read_to_string(chosen).await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_directory_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::new(dir.path().join("backups"), 10);
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("a/b")).await.unwrap();
        fs::write(tree.join("a/b/c.txt"), "deep").await.unwrap();

        let backup = store.create(&tree).await.unwrap();
        fs::remove_dir_all(&tree).await.unwrap();

        let op = store.restore(&backup, &tree).await.unwrap();
        assert_eq!(op, "directory_restore");
        assert_eq!(fs::read_to_string(tree.join("a/b/c.txt")).await.unwrap(), "deep");
    }

    #[tokio::test]
    async fn test_missing_backup() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::new(dir.path().join("backups"), 10);
        let err = store.locate(&dir.path().join("x.txt"), None).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn test_depth_bound() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("t");
        fs::create_dir_all(tree.join("1/2/3")).await.unwrap();
        let err = copy_dir(&tree, &dir.path().join("copy"), 1).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }
}
