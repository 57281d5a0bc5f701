//! Command handlers.
//!
//! Each subcommand maps to one handler here. Handlers take the project root
//! explicitly so tests can drive them against temporary directories, and
//! return a process exit code: `0` for a clean run, `2` when some modules
//! failed but the run completed. Run-level errors (bad manifest, cycle,
//! version conflict) propagate to `main`, which exits `1`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::error::ModmanError;
use crate::fetch::GitFetcher;
use crate::installer::{InstallReport, ModuleInstaller};
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::merge::{namespace_for, write_schema, ConfigTemplateMerger};
use crate::module::{ensure_layout, ModuleRegistry};
use crate::refresher::{ModuleRefresher, RefreshOutcome, RefreshReport};
use crate::resolver::DependencyResolver;

/// Resolve and install every module the project manifest declares.
///
/// Idempotent: modules already installed from a matching source are skipped.
pub async fn cmd_init(
    root: &Path,
    manifest_path: Option<PathBuf>,
    clone_dir: Option<PathBuf>,
) -> Result<i32> {
    let manifest_path = manifest_path.unwrap_or_else(|| root.join(MANIFEST_FILE));
    let manifest = Manifest::load(&manifest_path)?;
    ensure_layout(root)?;
    let mut registry = ModuleRegistry::scan(root)?;

    let fetcher = match &clone_dir {
        Some(dir) => GitFetcher::with_scratch_root(dir.clone()),
        None => GitFetcher::default(),
    };

    let plan = DependencyResolver::new(&fetcher).resolve(&manifest.modules).await?;
    info!(modules = plan.len(), "Resolved install plan");

    let mut installer = ModuleInstaller::new(&fetcher, root);
    if let Some(dir) = &clone_dir {
        installer = installer.with_scratch_root(dir);
    }
    let report = installer.install(&plan, &mut registry).await?;
    print_install_summary(&report);

    let schema = ConfigTemplateMerger::new().merge(&registry)?;
    let schema_path = write_schema(root, &schema)?;
    println!(
        "Wrote config schema ({} templates) to {}",
        schema.len(),
        schema_path.display()
    );

    Ok(if report.is_clean() { 0 } else { 2 })
}

/// Re-run refresh capabilities, then rebuild the config schema.
pub async fn cmd_refresh(root: &Path, target: Option<&str>, concurrency: usize) -> Result<i32> {
    let mut registry = ModuleRegistry::scan(root)?;

    let refresher = ModuleRefresher::with_concurrency(concurrency);
    let report = match refresher.refresh(&mut registry, target).await {
        Ok(report) => report,
        Err(ModmanError::NotFound(msg)) => {
            eprintln!("{}", msg);
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };
    print_refresh_summary(&report);

    // Refresh may have rewritten templates; the schema must follow.
    let schema = ConfigTemplateMerger::new().merge(&registry)?;
    write_schema(root, &schema)?;

    Ok(if report.is_clean() { 0 } else { 2 })
}

/// Print every installed module, one line each.
pub fn cmd_list(root: &Path) -> Result<i32> {
    let registry = ModuleRegistry::scan(root)?;
    if registry.is_empty() {
        println!("No modules installed.");
        return Ok(0);
    }

    println!(
        "{:<20} {:<8} {:<12} {:<8} SOURCE",
        "NAME", "TYPE", "VERSION", "REFRESH"
    );
    for record in registry.records() {
        let d = &record.descriptor;
        println!(
            "{:<20} {:<8} {:<12} {:<8} {}",
            d.name,
            d.module_type.to_string(),
            d.version,
            if d.has_refresh() { "yes" } else { "-" },
            d.source
        );
    }
    println!(
        "\n{} module(s), {} refreshable",
        registry.len(),
        registry.refreshable().len()
    );
    Ok(0)
}

/// Print one module's full descriptor.
pub fn cmd_info(root: &Path, name: &str) -> Result<i32> {
    let registry = ModuleRegistry::scan(root)?;
    let Some(record) = registry.get(name) else {
        eprintln!("Module '{}' is not installed", name);
        return Ok(1);
    };

    let d = &record.descriptor;
    println!("Name:        {}", d.name);
    println!("Type:        {}", d.module_type);
    println!("Version:     {}", d.version);
    println!("Source:      {}", d.source);
    println!("Path:        {}", record.path.display());
    if let Some(description) = &d.description {
        println!("Description: {}", description);
    }
    if !d.dependencies.is_empty() {
        println!("Dependencies:");
        for dep in &d.dependencies {
            println!("  - {}", dep);
        }
    }
    if !d.requirements.is_empty() {
        println!("Requirements:");
        for req in &d.requirements {
            println!("  - {}", req);
        }
    }
    if let Some(refresh) = &d.refresh {
        println!(
            "Refresh:     {} (timeout {}s)",
            refresh.command, refresh.timeout_secs
        );
    }
    if d.config_template.is_some() {
        println!("Config namespace: {}", namespace_for(d));
    }
    Ok(0)
}

fn print_install_summary(report: &InstallReport) {
    println!(
        "Install: {} installed, {} skipped, {} failed, {} blocked",
        report.succeeded.len(),
        report.skipped.len(),
        report.failed.len(),
        report.blocked.len()
    );
    for failure in &report.failed {
        eprintln!("  failed  {}: {}", failure.module, failure.error);
    }
    for blocked in &report.blocked {
        eprintln!("  blocked {} (needs {})", blocked.module, blocked.blocked_on);
    }
}

fn print_refresh_summary(report: &RefreshReport) {
    println!(
        "Refresh: {} refreshed, {} failed, {} skipped",
        report.succeeded(),
        report.failed(),
        report.skipped()
    );
    for entry in &report.entries {
        if let RefreshOutcome::Failed(reason) = &entry.outcome {
            eprintln!("  failed  {}: {}", entry.module, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleMetadata, DESCRIPTOR_FILE};
    use crate::source::ModuleSource;
    use std::fs;
    use tempfile::TempDir;

    fn install_fixture(root: &Path, name: &str) {
        let dir = root.join("plugins").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(DESCRIPTOR_FILE),
            serde_json::json!({"version": "1.0.0", "type": "plugin"}).to_string(),
        )
        .unwrap();
        ModuleMetadata {
            name: name.to_string(),
            source: ModuleSource::parse(&format!("https://github.com/acme/{}.git", name)).unwrap(),
        }
        .write(&dir)
        .unwrap();
    }

    #[test]
    fn test_list_empty_project() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(cmd_list(tmp.path()).unwrap(), 0);
    }

    #[test]
    fn test_list_with_modules() {
        let tmp = TempDir::new().unwrap();
        install_fixture(tmp.path(), "logger");
        assert_eq!(cmd_list(tmp.path()).unwrap(), 0);
    }

    #[test]
    fn test_info_known_module() {
        let tmp = TempDir::new().unwrap();
        install_fixture(tmp.path(), "logger");
        assert_eq!(cmd_info(tmp.path(), "logger").unwrap(), 0);
    }

    #[test]
    fn test_info_unknown_module_exits_nonzero() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(cmd_info(tmp.path(), "ghost").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_init_without_manifest_is_fatal() {
        let tmp = TempDir::new().unwrap();
        assert!(cmd_init(tmp.path(), None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_init_empty_manifest_is_clean() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(MANIFEST_FILE), r#"{"modules": []}"#).unwrap();
        assert_eq!(cmd_init(tmp.path(), None, None).await.unwrap(), 0);
        // Layout and schema are created even with nothing to install.
        assert!(tmp.path().join("plugins").is_dir());
        assert!(tmp.path().join(crate::merge::SCHEMA_FILE).exists());
    }

    #[tokio::test]
    async fn test_refresh_unknown_target_exits_nonzero() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            cmd_refresh(tmp.path(), Some("ghost"), 4).await.unwrap(),
            1
        );
    }
}
