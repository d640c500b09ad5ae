//! Bulk dependency upgrade subcommand
//!
//! Sweeps the whole workspace: the root first, then every package including
//! private ones. Version resolution and lockfile handling belong to the
//! package manager; this only invokes it in the right directories.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::exec::{Executor, ShellExecutor};
use crate::inventory::PackageInventory;
use crate::types::Package;

/// Command handed to the external package manager in each directory.
const UPGRADE_COMMAND: &str = "yarn upgrade";

/// Upgrade dependency manifests across the whole workspace.
pub async fn run(root: &str) -> Result<()> {
    info!("⏳ starting to upgrade dependencies in all workspace packages");

    let mut inventory = PackageInventory::new(root);
    inventory
        .init()
        .context("could not enumerate the workspace packages")?;

    let executor = ShellExecutor;
    upgrade_root(&executor, Path::new(root));
    for package in inventory.packages(true) {
        upgrade_package(&executor, &package);
    }

    info!("✔ completed upgrading dependencies");
    Ok(())
}

fn upgrade_root(executor: &dyn Executor, root: &Path) {
    info!("⏳ running the upgrade on the workspace root");
    match executor.run_in(root, UPGRADE_COMMAND) {
        Ok(output) => {
            info!("✔ successfully upgraded dependencies in the root project");
            debug!("{}", output.trim_end());
        }
        Err(err) => {
            error!("❌ failed to upgrade dependencies for the root project: {err:#}");
        }
    }
}

/// A failing package is logged and skipped; the sweep always finishes.
fn upgrade_package(executor: &dyn Executor, package: &Package) {
    info!("⏳ running the upgrade on {}", package.name);
    match executor.run_in(&package.path, UPGRADE_COMMAND) {
        Ok(output) => {
            info!("✔ successfully upgraded dependencies for {}", package.name);
            debug!("{}", output.trim_end());
        }
        Err(err) => {
            error!(
                "❌ failed to upgrade dependencies for {}: {err:#}",
                package.name
            );
        }
    }
}
