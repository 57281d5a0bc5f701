//! Module installation.
//!
//! The installer executes an `InstallPlan` against a project root: each new
//! module is fetched into a scratch directory, validated from its on-disk
//! descriptor, and committed into its type directory with a single atomic
//! rename. Scratch directories are `TempDir`s, so they are deleted on every
//! exit path, success or failure — a cancelled or crashed run leaves no
//! half-written module behind.
//!
//! Failure policy: a module-level failure never raises. It is recorded in
//! the report, modules that do not depend on it still install, and its
//! transitive dependents are reported as blocked without being attempted.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::error::{ModmanError, Result};
use crate::fetch::ModuleFetcher;
use crate::module::{ModuleDescriptor, ModuleMetadata, ModuleRecord, ModuleRegistry};
use crate::resolver::InstallPlan;

/// One module-scoped installation failure.
#[derive(Debug, Clone, Serialize)]
pub struct InstallFailure {
    /// The module that failed.
    pub module: String,
    /// The proximate cause.
    pub error: String,
}

/// A module that was never attempted because something it depends on failed.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedModule {
    /// The module that was skipped.
    pub module: String,
    /// The failed or blocked dependency that caused the skip.
    pub blocked_on: String,
}

/// Outcome ledger for one installation pass.
#[derive(Debug, Default, Serialize)]
pub struct InstallReport {
    /// Modules newly committed to the registry, in install order.
    pub succeeded: Vec<String>,
    /// Modules already installed from a matching source.
    pub skipped: Vec<String>,
    /// Modules whose installation failed, with the cause.
    pub failed: Vec<InstallFailure>,
    /// Modules not attempted because a dependency failed.
    pub blocked: Vec<BlockedModule>,
}

impl InstallReport {
    /// Whether the pass completed without module-level failures.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}

/// Executes install plans against a project root.
pub struct ModuleInstaller<'a, F: ModuleFetcher + ?Sized> {
    fetcher: &'a F,
    root: PathBuf,
    scratch_root: Option<PathBuf>,
}

impl<'a, F: ModuleFetcher + ?Sized> ModuleInstaller<'a, F> {
    /// Create an installer committing modules under `root`.
    pub fn new(fetcher: &'a F, root: &Path) -> Self {
        Self {
            fetcher,
            root: root.to_path_buf(),
            scratch_root: None,
        }
    }

    /// Place scratch clone directories under `dir` instead of the project
    /// root. Scratch and destination must share a filesystem or the commit
    /// rename fails with a cross-device error.
    pub fn with_scratch_root(mut self, dir: &Path) -> Self {
        self.scratch_root = Some(dir.to_path_buf());
        self
    }

    /// Execute the plan, committing each module into the registry.
    ///
    /// Returns the outcome ledger. Individual module failures are recorded,
    /// never raised; only registry-level inconsistencies raise.
    pub async fn install(
        &self,
        plan: &InstallPlan,
        registry: &mut ModuleRegistry,
    ) -> Result<InstallReport> {
        let mut report = InstallReport::default();
        // Names that failed or were blocked; their dependents must not run.
        let mut unavailable: HashSet<String> = HashSet::new();

        for descriptor in plan.modules() {
            if let Some(dep) = descriptor
                .dependencies
                .iter()
                .find(|d| unavailable.contains(d.name()))
            {
                warn!(
                    module = %descriptor.name,
                    blocked_on = %dep.name(),
                    "Skipping module: dependency unavailable"
                );
                unavailable.insert(descriptor.name.clone());
                report.blocked.push(BlockedModule {
                    module: descriptor.name.clone(),
                    blocked_on: dep.name().to_string(),
                });
                continue;
            }

            if let Some(existing) = registry.get(&descriptor.name) {
                if existing.descriptor.source == descriptor.source {
                    info!(module = %descriptor.name, "Already installed, skipping");
                    report.skipped.push(descriptor.name.clone());
                } else {
                    unavailable.insert(descriptor.name.clone());
                    report.failed.push(InstallFailure {
                        module: descriptor.name.clone(),
                        error: ModmanError::DestinationConflict {
                            module: descriptor.name.clone(),
                            path: existing.path.clone(),
                        }
                        .to_string(),
                    });
                }
                continue;
            }

            match self.install_one(descriptor).await {
                Ok(record) => {
                    info!(
                        module = %descriptor.name,
                        path = %record.path.display(),
                        "Installed module"
                    );
                    registry.insert(record)?;
                    report.succeeded.push(descriptor.name.clone());
                }
                Err(e) => {
                    warn!(module = %descriptor.name, error = %e, "Module installation failed");
                    unavailable.insert(descriptor.name.clone());
                    report.failed.push(InstallFailure {
                        module: descriptor.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Fetch, validate, and atomically commit one module.
    async fn install_one(&self, descriptor: &ModuleDescriptor) -> Result<ModuleRecord> {
        // Scratch directory is removed on drop, covering every exit path
        // below, including fetch and validation failures. It defaults to
        // the project root so the commit rename never crosses a filesystem
        // boundary (the system temp dir is often a separate tmpfs).
        let scratch = match &self.scratch_root {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                TempDir::new_in(dir)?
            }
            None => {
                fs::create_dir_all(&self.root)?;
                TempDir::new_in(&self.root)?
            }
        };
        let staged = scratch.path().join(&descriptor.name);

        self.fetcher.fetch(&descriptor.source, &staged).await?;

        // Validate from what actually landed on disk, not the metadata the
        // resolver saw: the upstream repository may have moved since.
        let on_disk = ModuleDescriptor::load(&staged, descriptor.source.clone())?;

        let type_dir = self.root.join(on_disk.module_type.dir_name());
        fs::create_dir_all(&type_dir)?;
        let dest = type_dir.join(&on_disk.name);
        if dest.exists() {
            return Err(ModmanError::DestinationConflict {
                module: on_disk.name.clone(),
                path: dest,
            });
        }

        ModuleMetadata {
            name: on_disk.name.clone(),
            source: on_disk.source.clone(),
        }
        .write(&staged)?;

        // Single rename: the module is either fully committed or absent.
        fs::rename(&staged, &dest)?;

        Ok(ModuleRecord {
            descriptor: on_disk,
            path: dest,
        })
    }
}
