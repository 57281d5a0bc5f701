//! Installed-module registry.
//!
//! The registry is the authoritative in-memory record of installed modules
//! and their on-disk locations, built by reading each module's descriptor
//! and discovery metadata once per invocation. It is an explicit object
//! passed through installer and refresher calls; there is no process-wide
//! singleton.
//!
//! Mutation rules: the installer adds entries, the refresher updates
//! descriptors in place. Everything else reads.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ModmanError, Result};
use crate::source::ModuleSource;

use super::types::{ModuleDescriptor, ModuleMetadata, ModuleType, DESCRIPTOR_FILE};

/// One installed module: its parsed descriptor plus its on-disk location.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// Parsed and validated descriptor.
    pub descriptor: ModuleDescriptor,
    /// Absolute path of the installed module directory.
    pub path: PathBuf,
}

/// In-memory index of installed modules, keyed by module name.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, ModuleRecord>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Build a registry by scanning the project's per-type module
    /// directories under `root`.
    ///
    /// Each subdirectory containing a descriptor file is indexed. Entries
    /// with missing or malformed metadata are logged and skipped; a broken
    /// module must not prevent the rest of the project from being listed.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut registry = Self::new();

        for module_type in ModuleType::all() {
            let type_dir = root.join(module_type.dir_name());
            if !type_dir.is_dir() {
                continue;
            }

            for entry in fs::read_dir(&type_dir)? {
                let entry = entry?;
                let module_dir = entry.path();
                if !module_dir.is_dir() || !module_dir.join(DESCRIPTOR_FILE).exists() {
                    continue;
                }

                match load_record(&module_dir) {
                    Ok(record) => {
                        info!(
                            module = %record.descriptor.name,
                            module_type = %record.descriptor.module_type,
                            version = %record.descriptor.version,
                            "Indexed installed module"
                        );
                        registry.insert(record)?;
                    }
                    Err(e) => {
                        warn!(
                            dir = %module_dir.display(),
                            error = %e,
                            "Failed to index module, skipping"
                        );
                    }
                }
            }
        }

        Ok(registry)
    }

    /// Add a module record.
    ///
    /// Re-inserting the same name with the same source replaces the entry.
    /// The same name with a different source is rejected: the registry never
    /// holds two installations claiming one name.
    pub fn insert(&mut self, record: ModuleRecord) -> Result<()> {
        if let Some(existing) = self.modules.get(&record.descriptor.name) {
            if existing.descriptor.source != record.descriptor.source {
                return Err(ModmanError::DestinationConflict {
                    module: record.descriptor.name.clone(),
                    path: existing.path.clone(),
                });
            }
        }
        self.modules.insert(record.descriptor.name.clone(), record);
        Ok(())
    }

    /// Replace the descriptor of an installed module in place, keeping its
    /// location. Used by the refresher after a successful refresh.
    pub fn update_descriptor(&mut self, name: &str, descriptor: ModuleDescriptor) -> Result<()> {
        let record = self
            .modules
            .get_mut(name)
            .ok_or_else(|| ModmanError::NotFound(format!("Module '{}' is not installed", name)))?;
        record.descriptor = descriptor;
        Ok(())
    }

    /// Look up an installed module by name.
    pub fn get(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.get(name)
    }

    /// Whether a module with this name is installed.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Number of installed modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// All records, sorted by module name for stable listing.
    pub fn records(&self) -> Vec<&ModuleRecord> {
        let mut records: Vec<&ModuleRecord> = self.modules.values().collect();
        records.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        records
    }

    /// Names of modules exposing a refresh capability, sorted.
    pub fn refreshable(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .values()
            .filter(|r| r.descriptor.has_refresh())
            .map(|r| r.descriptor.name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Read one module directory into a record: discovery metadata for the
/// source, then the descriptor validated against it.
fn load_record(module_dir: &Path) -> Result<ModuleRecord> {
    let metadata = ModuleMetadata::load(module_dir)?;
    let descriptor = ModuleDescriptor::load(module_dir, metadata.source)?;
    Ok(ModuleRecord {
        descriptor,
        path: module_dir.to_path_buf(),
    })
}

/// Create the per-type module directories under `root` if absent.
pub fn ensure_layout(root: &Path) -> Result<()> {
    for module_type in ModuleType::all() {
        fs::create_dir_all(root.join(module_type.dir_name()))?;
    }
    Ok(())
}
