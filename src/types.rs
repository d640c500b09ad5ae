//! Core types for the watch daemon

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Literal token in the change command that is replaced with the name of the
/// package that triggered the update.
pub const PACKAGE_TOKEN: &str = "%PACKAGE%";

/// Default per-package update command.
pub const DEFAULT_CHANGE_COMMAND: &str = "yarn workspace %PACKAGE% build";

/// Default file extension to watch.
pub const DEFAULT_EXTENSION: &str = "ts";

/// Default glob patterns excluded from watching.
pub const DEFAULT_IGNORE: [&str; 3] = ["**/node_modules/**", "**/dist/**", "**/.git/**"];

/// Default polling interval in milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 500;

/// Represents a package in the workspace
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    /// Package name (e.g., "@rafter/core")
    pub name: String,

    /// Package version (advisory, not enforced here)
    pub version: String,

    /// Absolute directory owned by this package
    pub path: PathBuf,

    /// Manifest `private` flag
    pub private: bool,

    /// Update state, mutated only by the supervisor
    pub state: PackageState,
}

/// Per-package update state machine: `Idle -> Updating -> Idle`, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Idle,
    Updating,
}

/// Immutable watch configuration captured at startup
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Long-running command kept alive by the daemon
    pub command: String,

    /// Per-package update command, may embed [`PACKAGE_TOKEN`]
    pub on_change: String,

    /// File extension watched inside each package
    pub extension: String,

    /// Glob patterns excluded from watching
    pub ignore: Vec<String>,

    /// Polling interval; zero means poll as fast as the platform allows
    pub delay: Duration,
}

/// Invalid watch configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the watched extension must not be empty")]
    EmptyExtension,
}

impl WatchConfig {
    /// Validate and build a configuration. A leading `.` on the extension is
    /// tolerated and stripped.
    pub fn new(
        command: String,
        on_change: String,
        extension: String,
        ignore: Vec<String>,
        delay_ms: u64,
    ) -> Result<Self, ConfigError> {
        let extension = extension.trim_start_matches('.').to_string();
        if extension.is_empty() {
            return Err(ConfigError::EmptyExtension);
        }

        Ok(Self {
            command,
            on_change,
            extension,
            ignore,
            delay: Duration::from_millis(delay_ms),
        })
    }

    /// The update command for a package, with the placeholder token
    /// substituted by the package name.
    pub fn on_change_for(&self, package: &str) -> String {
        self.on_change.replace(PACKAGE_TOKEN, package)
    }
}
