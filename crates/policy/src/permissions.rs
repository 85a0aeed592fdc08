use crate::path_policy::canonicalize_lenient;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Locations that can never be granted, together with everything above them.
const SYSTEM_PATHS: &[&str] = &[
    "/etc",
    "/root",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/usr/lib",
    "/boot",
    "/proc",
    "/sys",
    "/dev",
    "/var/lib/dpkg",
    "/var/lib/apt",
    "/System",
    "/Library",
    "C:\\Windows",
    "C:\\Program Files",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("Cannot add system path: {0}")]
    SystemPath(String),

    #[error("Cannot remove default path: {0}")]
    DefaultPath(String),

    #[error("Path is not in the allowed list: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowedPathInfo {
    pub path: String,
    pub exists: bool,
    pub is_directory: Option<bool>,
    pub absolute_path: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddPathOutcome {
    pub path: String,
    pub already_exists: bool,
    pub total_allowed_paths: usize,
}

/// Shared, mutable list of allowed filesystem roots.
///
/// Clones share state: a path added through one handle is visible to every
/// policy holding another.
#[derive(Debug, Clone, Default)]
pub struct AllowedPaths {
    base_dir: PathBuf,
    defaults: Arc<Vec<PathBuf>>,
    current: Arc<RwLock<Vec<PathBuf>>>,
}

impl AllowedPaths {
    pub fn new(base_dir: impl Into<PathBuf>, defaults: Vec<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            current: Arc::new(RwLock::new(defaults.clone())),
            defaults: Arc::new(defaults),
        }
    }

    /// Roots as configured, not yet canonicalized.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.current.read().clone()
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            canonicalize_lenient(path)
        } else {
            canonicalize_lenient(&self.base_dir.join(path))
        }
    }

    fn is_default(&self, resolved: &Path) -> bool {
        self.defaults.iter().any(|d| self.resolve(d) == resolved)
    }

    pub fn list(&self) -> Vec<AllowedPathInfo> {
        self.snapshot()
            .into_iter()
            .map(|path| {
                let absolute = self.resolve(&path);
                let exists = absolute.exists();
                AllowedPathInfo {
                    path: path.display().to_string(),
                    exists,
                    is_directory: exists.then(|| absolute.is_dir()),
                    absolute_path: absolute.display().to_string(),
                    is_default: self.is_default(&absolute),
                }
            })
            .collect()
    }

    pub fn add(&self, raw: &str) -> Result<AddPathOutcome, PermissionError> {
        if raw.trim().is_empty() || raw.contains('\0') {
            return Err(PermissionError::Invalid(raw.to_string()));
        }
        let resolved = self.resolve(Path::new(raw));
        check_admissible(&resolved).map_err(|_| PermissionError::SystemPath(raw.to_string()))?;
        check_admissible(Path::new(raw)).map_err(|_| PermissionError::SystemPath(raw.to_string()))?;

        let mut current = self.current.write();
        if current.iter().any(|p| self.resolve(p) == resolved) {
            return Ok(AddPathOutcome {
                path: resolved.display().to_string(),
                already_exists: true,
                total_allowed_paths: current.len(),
            });
        }

        current.push(resolved.clone());
        tracing::info!(path = %resolved.display(), "Added allowed path");
        Ok(AddPathOutcome {
            path: resolved.display().to_string(),
            already_exists: false,
            total_allowed_paths: current.len(),
        })
    }

    pub fn remove(&self, raw: &str) -> Result<PathBuf, PermissionError> {
        let resolved = self.resolve(Path::new(raw));
        if self.is_default(&resolved) {
            return Err(PermissionError::DefaultPath(raw.to_string()));
        }

        let mut current = self.current.write();
        let idx = current
            .iter()
            .position(|p| self.resolve(p) == resolved)
            .ok_or_else(|| PermissionError::NotFound(raw.to_string()))?;
        let removed = current.remove(idx);
        tracing::info!(path = %removed.display(), "Removed allowed path");
        Ok(removed)
    }

    pub fn reset(&self) {
        *self.current.write() = self.defaults.as_ref().clone();
        tracing::info!("Reset allowed paths to defaults");
    }
}

/// Reject system locations, anything nested under them, and any ancestor that
/// would contain them.
pub fn check_admissible(path: &Path) -> Result<(), PermissionError> {
    let denied = || PermissionError::SystemPath(path.display().to_string());

    if path
        .components()
        .any(|c| matches!(c, Component::Normal(part) if part == ".ssh"))
    {
        return Err(denied());
    }

    let text = path.to_string_lossy();
    for system in SYSTEM_PATHS {
        let system_path = Path::new(system);
        if path.starts_with(system_path) || system_path.starts_with(path) {
            return Err(denied());
        }
        // Windows-style entries compared textually on every platform.
        if system.contains('\\') && text.to_lowercase().starts_with(&system.to_lowercase()) {
            return Err(denied());
        }
    }
    Ok(())
}
