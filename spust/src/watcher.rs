//! Recursive source watcher that turns bursts of file events into single
//! rebuild triggers.

use crate::error::{CliError, Result as CliResult};

use std::panic::Location;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use error_location::ErrorLocation;
use log::{debug, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 256;

pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
    changes: mpsc::Receiver<PathBuf>,
    debounce: Duration,
}

impl SourceWatcher {
    /// Watch `root` recursively.
    ///
    /// `ignore` entries are matched against paths relative to `root`: a plain
    /// entry matches any path component or leading sub-path (`target`,
    /// `out/bundle`), an entry starting with `*` matches a suffix (`*.swp`).
    /// Hidden files and directories are always ignored.
    pub fn new(root: &Path, ignore: Vec<String>, debounce: Duration) -> CliResult<Self> {
        let root = std::fs::canonicalize(root)?;
        let (tx, changes) = mpsc::channel(EVENT_BUFFER);

        let filter_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("File watcher error: {e}");
                    return;
                }
            };

            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }

            for path in event.paths {
                if should_ignore(&path, &filter_root, &ignore) {
                    continue;
                }
                // A full buffer already guarantees a rebuild
                let _ = tx.try_send(path);
            }
        })
        .map_err(|source| watch_err(&root, source))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| watch_err(&root, source))?;

        debug!("Watching {} (debounce {}ms)", root.display(), debounce.as_millis());

        Ok(Self {
            _watcher: watcher,
            root,
            changes,
            debounce,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Wait for a change, then until no further change arrives for the
    /// debounce period. Returns the first changed path of the burst, or
    /// `None` once the watcher has stopped.
    pub async fn next_change(&mut self) -> Option<PathBuf> {
        let first = self.changes.recv().await?;

        let mut collapsed = 0usize;
        while let Ok(Some(_)) = tokio::time::timeout(self.debounce, self.changes.recv()).await {
            collapsed += 1;
        }

        if collapsed > 0 {
            debug!("Collapsed {collapsed} further change(s) after {}", first.display());
        }
        Some(first)
    }
}

#[track_caller]
fn watch_err(path: &Path, source: notify::Error) -> CliError {
    CliError::Watch {
        path: path.to_path_buf(),
        source,
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Whether a change at `path` should not trigger a rebuild.
pub fn should_ignore(path: &Path, root: &Path, ignore: &[String]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };

    let hidden = relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    });
    if hidden {
        return true;
    }

    let text = relative.to_string_lossy();
    ignore.iter().any(|pattern| {
        if let Some(suffix) = pattern.strip_prefix('*') {
            text.ends_with(suffix)
        } else {
            relative.starts_with(pattern)
                || relative
                    .components()
                    .any(|component| component.as_os_str() == pattern.as_str())
        }
    })
}
