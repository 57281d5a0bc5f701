//! Project manifest loading.
//!
//! The manifest (`modman.json` by default) declares the root set of module
//! source references for a project:
//!
//! ```json
//! {
//!     "modules": [
//!         "https://github.com/acme/core.git",
//!         "https://github.com/acme/logger.git@v2.1.0"
//!     ]
//! }
//! ```
//!
//! Any malformation is fatal: resolution cannot start without a valid root
//! set.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{ModmanError, Result};
use crate::source::ModuleSource;

/// Default manifest file name at the project root.
pub const MANIFEST_FILE: &str = "modman.json";

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    modules: Vec<String>,
}

/// Parsed project manifest: the root module references to resolve.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Root module source references, in declaration order.
    pub modules: Vec<ModuleSource>,
}

impl Manifest {
    /// Load and parse a manifest file.
    ///
    /// # Errors
    /// `ModmanError::ManifestParse` if the file is missing, is not valid
    /// JSON, or contains a malformed source reference.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ModmanError::ManifestParse(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let raw: RawManifest = serde_json::from_str(&content).map_err(|e| {
            ModmanError::ManifestParse(format!("Malformed {}: {}", path.display(), e))
        })?;

        let modules = raw
            .modules
            .iter()
            .map(|r| ModuleSource::parse(r))
            .collect::<Result<Vec<_>>>()?;

        info!(
            manifest = %path.display(),
            modules = modules.len(),
            "Loaded project manifest"
        );

        Ok(Self { modules })
    }
}
