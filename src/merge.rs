//! Config template merging.
//!
//! Each installed module may carry a configuration template in its
//! descriptor. The merger folds every template into a single schema
//! document, keyed by a per-module namespace so templates can never
//! shadow each other:
//!
//! ```json
//! {
//!     "plugin.logger": { "level": "info", "sinks": ["stdout"] },
//!     "manager.deploy": { "strategy": "rolling" }
//! }
//! ```
//!
//! Merging is deterministic: the same registry contents always produce the
//! same schema, regardless of install order.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{ModmanError, Result};
use crate::module::{ModuleDescriptor, ModuleRegistry};

/// Merged schema file name at the project root.
pub const SCHEMA_FILE: &str = "modman.schema.json";

/// Unified configuration schema assembled from module templates.
///
/// Keys are module namespaces (`"{type}.{name}"`); values are the modules'
/// templates, carried through verbatim.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct MergedSchema {
    entries: Map<String, Value>,
}

impl MergedSchema {
    /// Number of namespaced templates in the schema.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no module contributed a template.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up one module's template by namespace.
    pub fn get(&self, namespace: &str) -> Option<&Value> {
        self.entries.get(namespace)
    }

    /// Namespaces present in the schema, in sorted order.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// The schema namespace a module's template merges under.
pub fn namespace_for(descriptor: &ModuleDescriptor) -> String {
    format!("{}.{}", descriptor.module_type, descriptor.name)
}

/// Merges installed modules' config templates into a unified schema.
#[derive(Debug, Default)]
pub struct ConfigTemplateMerger;

impl ConfigTemplateMerger {
    pub fn new() -> Self {
        Self
    }

    /// Build the unified schema from every installed module's template.
    ///
    /// # Errors
    /// `ModmanError::MergeConflict` if two modules claim the same namespace
    /// with different templates. Distinct module types never collide because
    /// the type is part of the namespace.
    pub fn merge(&self, registry: &ModuleRegistry) -> Result<MergedSchema> {
        let mut schema = MergedSchema::default();
        for record in registry.records() {
            self.merge_into(&mut schema, &record.descriptor)?;
        }
        info!(
            modules = registry.len(),
            templates = schema.len(),
            "Merged config templates"
        );
        Ok(schema)
    }

    /// Fold one module's template into an existing schema.
    ///
    /// Modules without a template contribute nothing. Re-merging an
    /// identical template is a no-op, so incremental merges stay idempotent.
    pub fn merge_into(&self, schema: &mut MergedSchema, descriptor: &ModuleDescriptor) -> Result<()> {
        let Some(template) = &descriptor.config_template else {
            return Ok(());
        };

        let namespace = namespace_for(descriptor);
        match schema.entries.get(&namespace) {
            Some(existing) if existing == template => {}
            Some(_) => {
                return Err(ModmanError::MergeConflict { namespace });
            }
            None => {
                debug!(namespace = %namespace, "Merged config template");
                schema.entries.insert(namespace, template.clone());
            }
        }
        Ok(())
    }
}

/// Write the merged schema to the project root, replacing any prior copy.
pub fn write_schema(root: &Path, schema: &MergedSchema) -> Result<PathBuf> {
    let path = root.join(SCHEMA_FILE);
    let content = serde_json::to_string_pretty(schema)?;
    fs::write(&path, content)?;
    Ok(path)
}
