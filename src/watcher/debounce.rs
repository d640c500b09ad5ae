//! Change detection
//!
//! Translates raw filesystem mutation signals into a clean change stream
//! scoped to the watched packages. Detection is interval polling rather than
//! native OS notification: it is portable and does not double-fire when an
//! editor's own watcher touches a file several times per save.

use std::path::PathBuf;

use glob::Pattern;
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};

use crate::types::{Package, WatchConfig};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to establish the file watch: {0}")]
    Subscribe(#[from] notify::Error),

    #[error("invalid ignore pattern \"{pattern}\": {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
}

/// Where change events come from. The daemon only ever sees a stream of
/// changed paths, so the polling backend can be swapped for native
/// notification without touching the supervisor.
pub trait ChangeSource: Send {
    /// Establish the subscription and return the event stream. Calling this
    /// again closes the previous subscription first, so no duplicate events
    /// are ever delivered.
    fn watch(
        &mut self,
        packages: &[Package],
        config: &WatchConfig,
    ) -> Result<UnboundedReceiver<PathBuf>, WatchError>;

    /// Drop the current subscription, if any.
    fn close(&mut self);
}

/// Glob filter applied to every raw event.
struct WatchFilter {
    include: Vec<Pattern>,
    ignore: Vec<Pattern>,
}

impl WatchFilter {
    fn new(packages: &[Package], config: &WatchConfig) -> Result<Self, WatchError> {
        let include = packages
            .iter()
            .map(|package| {
                let pattern = format!("{}/**/*.{}", package.path.display(), config.extension);
                compile(&pattern)
            })
            .collect::<Result<_, _>>()?;

        let ignore = config
            .ignore
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<_, _>>()?;

        Ok(Self { include, ignore })
    }

    fn matches(&self, path: &std::path::Path) -> bool {
        if self.ignore.iter().any(|p| p.matches_path(path)) {
            return false;
        }
        self.include.iter().any(|p| p.matches_path(path))
    }
}

fn compile(pattern: &str) -> Result<Pattern, WatchError> {
    Pattern::new(pattern).map_err(|source| WatchError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Polling-based [`ChangeSource`] over the package roots.
#[derive(Default)]
pub struct ChangeDebouncer {
    watcher: Option<PollWatcher>,
}

impl ChangeDebouncer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeSource for ChangeDebouncer {
    fn watch(
        &mut self,
        packages: &[Package],
        config: &WatchConfig,
    ) -> Result<UnboundedReceiver<PathBuf>, WatchError> {
        // Re-watching must never deliver events twice.
        self.close();

        let filter = WatchFilter::new(packages, config)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let notify_config = notify::Config::default()
            .with_poll_interval(config.delay)
            .with_compare_contents(false)
            .with_follow_symlinks(false);

        let mut watcher = PollWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) if matches!(event.kind, EventKind::Modify(_)) => {
                    for path in event.paths {
                        if filter.matches(&path) {
                            let _ = tx.send(path);
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => warn!("⏳ the file watch reported an error: {err}"),
            },
            notify_config,
        )?;

        for package in packages {
            if let Err(err) = watcher.watch(&package.path, RecursiveMode::Recursive) {
                warn!(
                    "❌ cannot watch {} at {}: {err}",
                    package.name,
                    package.path.display()
                );
            }
        }

        let watched: Vec<String> = packages
            .iter()
            .map(|p| format!("{}/**/*.{}", p.path.display(), config.extension))
            .collect();
        info!("👀 watching the following paths: {watched:?}");

        self.watcher = Some(watcher);
        Ok(rx)
    }

    fn close(&mut self) {
        self.watcher.take();
    }
}
