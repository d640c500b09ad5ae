//! The watch daemon subcommand

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::exec::ShellExecutor;
use crate::inventory::PackageInventory;
use crate::types::WatchConfig;
use crate::watcher::debounce::ChangeDebouncer;
use crate::watcher::supervisor::RebuildSupervisor;

/// Run the watch daemon until it is interrupted.
pub async fn run(
    root: &str,
    command: String,
    change: String,
    extension: String,
    ignore: Vec<String>,
    delay: u64,
) -> Result<()> {
    let config = WatchConfig::new(command, change, extension, ignore, delay)?;
    debug!("watch configuration: {config:?}");

    let mut inventory = PackageInventory::new(root);
    let mut source = ChangeDebouncer::new();
    let supervisor = RebuildSupervisor::new(config, Arc::new(ShellExecutor));
    supervisor.start(&mut inventory, &mut source).await
}
