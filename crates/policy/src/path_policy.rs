use crate::decision::{DenyReason, PolicyViolation, SecurityDecision};
use crate::permissions::AllowedPaths;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// What the caller intends to do with a path. Extension rules only apply to
/// content access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAccess {
    Read,
    Write,
    Other,
}

/// Filesystem allowlist policy.
///
/// Roots are canonicalized on every evaluation, so allowlist changes made by an
/// administrator are seen by the very next call.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    base_dir: PathBuf,
    roots: AllowedPaths,
    allowed_extensions: Vec<String>,
    blocked_extensions: Vec<String>,
    blocked_patterns: Vec<String>,
}

impl PathPolicy {
    /// `base_dir` anchors relative request paths and relative roots.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_allowed_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots = roots.into_iter().map(Into::into).collect();
        self.roots = AllowedPaths::new(self.base_dir.clone(), roots);
        self
    }

    /// Share an existing allowlist handle instead of creating a new one.
    pub fn with_allowed_paths(mut self, roots: AllowedPaths) -> Self {
        self.roots = roots;
        self
    }

    pub fn allowed_paths(&self) -> &AllowedPaths {
        &self.roots
    }

    pub fn with_allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_extensions = exts.into_iter().map(|e| normalize_extension(e.as_ref())).collect();
        self
    }

    pub fn with_blocked_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blocked_extensions = exts.into_iter().map(|e| normalize_extension(e.as_ref())).collect();
        self
    }

    pub fn with_blocked_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_patterns = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute, symlink-resolved form of a request path. The path does not
    /// have to exist.
    pub fn resolve(&self, raw: impl AsRef<Path>) -> PathBuf {
        let raw = raw.as_ref();
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.base_dir.join(raw)
        };
        canonicalize_lenient(&joined)
    }

    /// Canonical allowed roots as of now.
    pub fn canonical_roots(&self) -> Vec<PathBuf> {
        self.roots.snapshot().iter().map(|r| self.resolve(r)).collect()
    }

    /// True when `canonical` equals or is nested under an allowed root.
    /// Comparison is per path component, so `/home/bob` never admits `/home/bob2`.
    pub fn contains(&self, canonical: &Path) -> bool {
        self.canonical_roots()
            .iter()
            .any(|root| canonical.starts_with(root))
    }

    pub fn is_root(&self, canonical: &Path) -> bool {
        self.canonical_roots().iter().any(|root| root == canonical)
    }

    pub fn evaluate(&self, raw: &str, access: PathAccess) -> SecurityDecision {
        match self.check(raw, access) {
            Ok(_) => SecurityDecision::Allow,
            Err(violation) => SecurityDecision::Deny(violation),
        }
    }

    /// Evaluate `raw` and return its canonical form when allowed.
    pub fn check(&self, raw: &str, access: PathAccess) -> Result<PathBuf, PolicyViolation> {
        if raw.trim().is_empty() {
            return Err(PolicyViolation::new(DenyReason::MalformedTarget, "Path is empty"));
        }
        if raw.contains('\0') {
            return Err(PolicyViolation::new(
                DenyReason::MalformedTarget,
                "Path contains a NUL byte",
            ));
        }

        let canonical = self.resolve(raw);

        if !self.contains(&canonical) {
            let has_parent_segments = Path::new(raw)
                .components()
                .any(|c| matches!(c, Component::ParentDir));
            if has_parent_segments {
                return Err(PolicyViolation::new(
                    DenyReason::TraversalDetected,
                    format!("Directory traversal detected: {} resolves to {}", raw, canonical.display()),
                ));
            }
            return Err(PolicyViolation::new(
                DenyReason::OutsideAllowlist,
                format!("Path not in allowed directories: {}", canonical.display()),
            ));
        }

        let canonical_str = canonical.to_string_lossy();
        if let Some(pattern) = self
            .blocked_patterns
            .iter()
            .find(|p| canonical_str.contains(p.as_str()))
        {
            return Err(PolicyViolation::new(
                DenyReason::BlockedPattern,
                format!("Path contains blocked pattern: {}", pattern),
            ));
        }

        if matches!(access, PathAccess::Read | PathAccess::Write) {
            if let Some(ext) = canonical.extension().and_then(|e| e.to_str()) {
                let ext = normalize_extension(ext);
                let blocked = self.blocked_extensions.contains(&ext);
                let not_allowed =
                    !self.allowed_extensions.is_empty() && !self.allowed_extensions.contains(&ext);
                if blocked || not_allowed {
                    return Err(PolicyViolation::new(
                        DenyReason::BlockedExtension,
                        format!("File extension not allowed: {}", ext),
                    ));
                }
            }
        }

        Ok(canonical)
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Resolve `.` and `..` without touching the filesystem. `..` never climbs
/// above the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor (resolving symlinks) and
/// re-append the components that do not exist yet.
pub fn canonicalize_lenient(path: &Path) -> PathBuf {
    let normalized = normalize_lexically(path);
    let mut existing: &Path = &normalized;
    let mut missing = Vec::new();

    loop {
        if let Ok(real) = fs::canonicalize(existing) {
            let mut out = real;
            for part in missing.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}
