use crate::error::ToolError;
use chrono::Utc;
use notify_debouncer_full::{
    new_debouncer, notify::RecommendedWatcher, notify::RecursiveMode, DebounceEventResult, Debouncer,
    RecommendedCache,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub path: String,
    pub timestamp: String,
}

struct ActiveWatch {
    root: PathBuf,
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    events: Arc<Mutex<Vec<ChangeEvent>>>,
}

/// At most one recursive watch at a time; events queue until it is stopped.
#[derive(Default)]
pub struct FileWatcher {
    active: Mutex<Option<ActiveWatch>>,
}

impl FileWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `root`, replacing any existing watch.
    pub fn start(&self, root: &Path) -> Result<(), ToolError> {
        let events: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            match result {
                Ok(batch) => {
                    use notify_debouncer_full::notify::EventKind;
                    for event in batch {
                        let change_type = match event.kind {
                            EventKind::Create(_) => ChangeType::Created,
                            EventKind::Modify(_) => ChangeType::Modified,
                            EventKind::Remove(_) => ChangeType::Deleted,
                            _ => continue,
                        };
                        for path in &event.paths {
                            debug!(path = %path.display(), "file watcher event");
                            sink.lock().push(ChangeEvent {
                                change_type: change_type.clone(),
                                path: path.display().to_string(),
                                timestamp: Utc::now().to_rfc3339(),
                            });
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "file watcher error");
                    }
                }
            }
        })
        .map_err(|e| ToolError::Execution(format!("Failed to start watching: {}", e)))?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| ToolError::Execution(format!("Failed to start watching: {}", e)))?;

        let previous = self.active.lock().replace(ActiveWatch {
            root: root.to_path_buf(),
            _debouncer: debouncer,
            events,
        });
        if let Some(prev) = previous {
            info!(dir = %prev.root.display(), "Replaced active file watch");
        }
        info!(dir = %root.display(), "file watcher: watching directory");
        Ok(())
    }

    /// Stop the active watch and hand back its queued events.
    pub fn stop(&self) -> Option<(PathBuf, Vec<ChangeEvent>)> {
        let watch = self.active.lock().take()?;
        let ActiveWatch {
            root,
            _debouncer: debouncer,
            events,
        } = watch;
        drop(debouncer);
        let events = std::mem::take(&mut *events.lock());
        Some((root, events))
    }

    pub fn is_watching(&self) -> bool {
        self.active.lock().is_some()
    }
}
