//! The change-update-restart supervisor
//!
//! Reacts to each change event by resolving the owning package, guarding
//! against re-entrant updates on that package, running the package's update
//! command, and restarting the long-running command. After startup, nothing
//! that happens in here may bring the daemon down.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::exec::Executor;
use crate::inventory::{owning_package_index, PackageInventory};
use crate::types::{Package, PackageState, WatchConfig};
use crate::watcher::debounce::ChangeSource;
use crate::watcher::process::ProcessController;

pub struct RebuildSupervisor {
    config: WatchConfig,
    executor: Arc<dyn Executor>,
    controller: ProcessController,
    /// The package table. Locked only for short, non-awaiting sections;
    /// the supervisor is the single writer of the per-package state.
    packages: Mutex<Vec<Package>>,
}

/// Outcome of trying to claim the package owning a changed path.
enum Claim {
    NotFound,
    Busy(String),
    Acquired(String),
}

impl RebuildSupervisor {
    pub fn new(config: WatchConfig, executor: Arc<dyn Executor>) -> Arc<Self> {
        Arc::new(Self {
            controller: ProcessController::new(Arc::clone(&executor)),
            executor,
            config,
            packages: Mutex::new(Vec::new()),
        })
    }

    /// Run the daemon: load the inventory, launch the long-running command,
    /// then react to change events until the stream ends or the daemon is
    /// interrupted. Only inventory and watch-subscription setup can fail
    /// here; everything later is logged and swallowed.
    pub async fn start(
        self: &Arc<Self>,
        inventory: &mut PackageInventory,
        source: &mut dyn ChangeSource,
    ) -> Result<()> {
        inventory
            .init()
            .context("could not enumerate the workspace packages")?;
        let packages = inventory.packages(false);
        info!("✔ loaded {} workspace packages", packages.len());
        self.install_packages(packages.clone());

        self.controller.restart(&self.config.command).await;
        if let Some(pid) = self.controller.current_pid().await {
            debug!("long-running command started with pid {pid}");
        }

        let mut events = source
            .watch(&packages, &self.config)
            .context("could not establish the file watch")?;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("❌ interrupt received, shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(path) => {
                        let supervisor = Arc::clone(self);
                        tokio::spawn(async move {
                            supervisor.on_change(&path).await;
                        });
                    }
                    None => break,
                },
            }
        }

        self.controller.shutdown().await;
        Ok(())
    }

    /// Handle a single change event. Never fails: every error in the cycle
    /// is logged and swallowed so the watch loop survives.
    pub async fn on_change(&self, path: &Path) {
        info!("⏳ \"{}\" has changed", path.display());

        let package = match self.claim(path) {
            Claim::NotFound => {
                info!("👀 no package owns \"{}\", ignoring", path.display());
                return;
            }
            Claim::Busy(name) => {
                info!("👀 {name} is already in the process of updating");
                return;
            }
            Claim::Acquired(name) => name,
        };

        if self.update(&package).await {
            self.controller.restart(&self.config.command).await;
        }
    }

    /// Run the interpolated update command for a claimed package. The claim
    /// is released however this exits, so a failed update can never lock a
    /// package out permanently. Returns whether the update succeeded.
    async fn update(&self, package: &str) -> bool {
        let _claim = ClaimGuard {
            supervisor: self,
            package,
        };

        let command = self.config.on_change_for(package);
        info!("⏳ {package} will now run \"{command}\", please wait");

        let executor = Arc::clone(&self.executor);
        let run = {
            let command = command.clone();
            tokio::task::spawn_blocking(move || executor.run(&command))
        };

        match run.await {
            Ok(Ok(output)) => {
                debug!("{}", output.trim_end());
                info!("✔ successfully completed updating {package}");
                true
            }
            Ok(Err(err)) => {
                error!("❌ \"{command}\" failed for {package}: {err:#}");
                false
            }
            Err(err) => {
                error!("❌ the update task for {package} did not finish: {err}");
                false
            }
        }
    }

    /// Replace the package table. Called once at startup with the loaded
    /// inventory.
    fn install_packages(&self, packages: Vec<Package>) {
        *self.lock_packages() = packages;
    }

    fn claim(&self, path: &Path) -> Claim {
        let mut packages = self.lock_packages();
        let Some(index) = owning_package_index(&packages, path) else {
            return Claim::NotFound;
        };

        let package = &mut packages[index];
        match package.state {
            PackageState::Updating => Claim::Busy(package.name.clone()),
            PackageState::Idle => {
                package.state = PackageState::Updating;
                Claim::Acquired(package.name.clone())
            }
        }
    }

    fn release(&self, name: &str) {
        let mut packages = self.lock_packages();
        if let Some(package) = packages.iter_mut().find(|p| p.name == name) {
            package.state = PackageState::Idle;
        }
    }

    fn lock_packages(&self) -> MutexGuard<'_, Vec<Package>> {
        // Keep serving even if another handler panicked while holding the lock.
        self.packages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn state_of(&self, name: &str) -> Option<PackageState> {
        self.lock_packages()
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.state)
    }
}

/// Releases the per-package claim on drop.
struct ClaimGuard<'a> {
    supervisor: &'a RebuildSupervisor,
    package: &'a str,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.supervisor.release(self.package);
    }
}
