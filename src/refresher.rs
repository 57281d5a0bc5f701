//! Module refreshing.
//!
//! Re-invokes each installed module's declared refresh command in the
//! module's own directory, with a bounded timeout, and reconciles the
//! registry with whatever metadata the refresh rewrote. This is a
//! partial-failure-tolerant batch pass: a stale or broken third-party
//! module must never block the refresh of its siblings.
//!
//! Independent modules refresh concurrently, bounded by a fixed-size worker
//! pool (`Semaphore` + `JoinSet`). Registry writes are applied serially
//! after the concurrent phase, so refresh never races the shared registry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{ModmanError, Result};
use crate::module::{ModuleDescriptor, ModuleRegistry, RefreshSpec};
use crate::source::ModuleSource;

/// Default number of modules refreshed concurrently.
const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome of one module's refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshOutcome {
    /// The refresh command succeeded and the registry entry was updated.
    Success,
    /// The refresh failed; the captured fault.
    Failed(String),
    /// The module exposes no refresh capability.
    Skipped,
}

/// Per-module entry in a refresh report.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshEntry {
    /// The module name.
    pub module: String,
    /// What happened.
    pub outcome: RefreshOutcome,
}

/// Outcome ledger for one refresh pass, sorted by module name.
#[derive(Debug, Default, Serialize)]
pub struct RefreshReport {
    /// One entry per targeted module.
    pub entries: Vec<RefreshEntry>,
}

impl RefreshReport {
    /// Modules refreshed successfully.
    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == RefreshOutcome::Success)
            .count()
    }

    /// Modules whose refresh failed.
    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, RefreshOutcome::Failed(_)))
            .count()
    }

    /// Modules without refresh capability.
    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == RefreshOutcome::Skipped)
            .count()
    }

    /// Whether every targeted module either refreshed or had nothing to do.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }
}

/// Work item handed to the concurrent phase.
struct RefreshTarget {
    name: String,
    path: PathBuf,
    source: ModuleSource,
    spec: RefreshSpec,
}

/// Re-runs refresh capabilities across the installed registry.
pub struct ModuleRefresher {
    concurrency: usize,
}

impl Default for ModuleRefresher {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ModuleRefresher {
    /// Create a refresher with the default worker-pool size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the worker-pool size (minimum 1).
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Refresh one named module, or every module exposing a refresh
    /// capability when `target` is `None`.
    ///
    /// Individual refresh failures are recorded in the report; only a
    /// missing `target` raises.
    pub async fn refresh(
        &self,
        registry: &mut ModuleRegistry,
        target: Option<&str>,
    ) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        let mut targets: Vec<RefreshTarget> = Vec::new();

        match target {
            Some(name) => {
                let record = registry
                    .get(name)
                    .ok_or_else(|| ModmanError::NotFound(format!("Module '{}' is not installed", name)))?;
                match &record.descriptor.refresh {
                    Some(spec) => targets.push(RefreshTarget {
                        name: record.descriptor.name.clone(),
                        path: record.path.clone(),
                        source: record.descriptor.source.clone(),
                        spec: spec.clone(),
                    }),
                    None => report.entries.push(RefreshEntry {
                        module: name.to_string(),
                        outcome: RefreshOutcome::Skipped,
                    }),
                }
            }
            None => {
                for record in registry.records() {
                    match &record.descriptor.refresh {
                        Some(spec) => targets.push(RefreshTarget {
                            name: record.descriptor.name.clone(),
                            path: record.path.clone(),
                            source: record.descriptor.source.clone(),
                            spec: spec.clone(),
                        }),
                        None => report.entries.push(RefreshEntry {
                            module: record.descriptor.name.clone(),
                            outcome: RefreshOutcome::Skipped,
                        }),
                    }
                }
            }
        }

        // Concurrent phase: run refresh commands and re-read descriptors.
        // No registry access in here; updates are applied afterwards.
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<(String, Result<ModuleDescriptor>)> = JoinSet::new();

        for target in targets {
            let permit = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = permit.acquire().await;
                let outcome = run_refresh(&target).await;
                (target.name, outcome)
            });
        }

        let mut results: Vec<(String, Result<ModuleDescriptor>)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "Refresh task panicked"),
            }
        }

        // Serial phase: reconcile the registry with refreshed metadata.
        for (name, outcome) in results {
            match outcome {
                Ok(descriptor) => {
                    info!(module = %name, version = %descriptor.version, "Refreshed module");
                    registry.update_descriptor(&name, descriptor)?;
                    report.entries.push(RefreshEntry {
                        module: name,
                        outcome: RefreshOutcome::Success,
                    });
                }
                Err(e) => {
                    warn!(module = %name, error = %e, "Module refresh failed");
                    report.entries.push(RefreshEntry {
                        module: name,
                        outcome: RefreshOutcome::Failed(e.to_string()),
                    });
                }
            }
        }

        report.entries.sort_by(|a, b| a.module.cmp(&b.module));
        Ok(report)
    }
}

/// Run one module's refresh command in its own directory, then re-read its
/// descriptor from disk.
async fn run_refresh(target: &RefreshTarget) -> Result<ModuleDescriptor> {
    let timeout = Duration::from_secs(target.spec.timeout_secs);
    info!(module = %target.name, command = %target.spec.command, "Running refresh");

    let output = tokio::time::timeout(
        timeout,
        Command::new("sh")
            .arg("-c")
            .arg(&target.spec.command)
            .current_dir(&target.path)
            .output(),
    )
    .await
    .map_err(|_| ModmanError::RefreshFailure {
        module: target.name.clone(),
        reason: format!("timed out after {}s", target.spec.timeout_secs),
    })?
    .map_err(|e| ModmanError::RefreshFailure {
        module: target.name.clone(),
        reason: format!("Failed to spawn refresh command: {}", e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ModmanError::RefreshFailure {
            module: target.name.clone(),
            reason: format!(
                "exit status {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        });
    }

    // The refresh may have rewritten version or config template; pick up
    // whatever is on disk now.
    ModuleDescriptor::load(&target.path, target.source.clone()).map_err(|e| {
        ModmanError::RefreshFailure {
            module: target.name.clone(),
            reason: format!("descriptor unreadable after refresh: {}", e),
        }
    })
}
