use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// An event from the content watcher, ready for the host to process by
/// rebuilding the bundle wholesale.
#[derive(Debug, Clone)]
pub struct WatcherEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// The kind of file change detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// Watches a content directory for lesson and context file changes.
/// Debounced events are sent through an mpsc channel; the receiver decides
/// when to re-run discovery. No incremental invalidation is attempted.
pub struct ContentWatcher {
    _watcher: RecommendedWatcher,
    /// Handle to the background thread processing events
    _thread: std::thread::JoinHandle<()>,
    /// Receiver for debounced file change events
    pub event_rx: mpsc::Receiver<WatcherEvent>,
}

impl ContentWatcher {
    /// Start watching the content root recursively. Debounced events (100ms)
    /// are available via `event_rx`.
    pub fn start(root: &Path) -> Result<Self, notify::Error> {
        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();
        let (event_tx, event_rx) = mpsc::channel::<WatcherEvent>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        // Background thread to process events with debouncing
        let thread = std::thread::spawn(move || {
            let debounce = Duration::from_millis(100);
            let mut pending: Vec<(PathBuf, ChangeKind)> = Vec::new();
            let mut last_event = Instant::now();

            loop {
                match notify_rx.recv_timeout(debounce) {
                    Ok(Ok(event)) => {
                        let kind = match event.kind {
                            EventKind::Create(_) => Some(ChangeKind::Created),
                            EventKind::Modify(_) => Some(ChangeKind::Modified),
                            EventKind::Remove(_) => Some(ChangeKind::Deleted),
                            _ => None,
                        };

                        if let Some(kind) = kind {
                            for path in event.paths {
                                if is_content_file(&path) {
                                    pending.push((path, kind));
                                }
                            }
                        }
                        last_event = Instant::now();
                    }
                    Ok(Err(e)) => {
                        log::warn!("Content watcher error: {e}");
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        // Debounce: if enough time has passed since the last event, flush
                        if !pending.is_empty() && last_event.elapsed() >= debounce {
                            // Deduplicate paths (keep last change kind)
                            let mut seen = std::collections::HashMap::new();
                            for (path, kind) in pending.drain(..) {
                                seen.insert(path, kind);
                            }
                            for (path, kind) in seen {
                                if event_tx.send(WatcherEvent { path, kind }).is_err() {
                                    return; // Receiver dropped
                                }
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        // Watcher was dropped, exit the thread
                        break;
                    }
                }
            }
        });

        Ok(ContentWatcher {
            _watcher: watcher,
            _thread: thread,
            event_rx,
        })
    }
}

/// Check whether a changed path affects the bundle: lesson markdown, context
/// metadata, or a context's schema/seed file.
fn is_content_file(path: &Path) -> bool {
    if matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("yaml") | Some("yml")
    ) {
        return true;
    }
    matches!(
        path.file_stem().and_then(|s| s.to_str()),
        Some("schema") | Some("seed")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_content_file() {
        assert!(is_content_file(Path::new("lessons/01-intro.md")));
        assert!(is_content_file(Path::new("_contexts/people/context.yaml")));
        assert!(is_content_file(Path::new("_contexts/people/schema.sql")));
        assert!(is_content_file(Path::new("_contexts/people/seed.tql")));
        assert!(!is_content_file(Path::new("assets/logo.png")));
        assert!(!is_content_file(Path::new("notes.txt")));
    }
}
