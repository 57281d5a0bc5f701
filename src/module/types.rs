//! Module descriptor types and on-disk metadata parsing.
//!
//! Each installed module carries two files at its root:
//!
//! - `module.json` — the descriptor the module's authors ship: version,
//!   type, dependencies, requirements, optional config template, optional
//!   refresh command.
//! - `.modman.json` — discovery metadata stamped by the installer at commit
//!   time, recording the source reference the module was installed from.
//!
//! # Descriptor Format
//!
//! ```json
//! {
//!     "version": "1.4.0",
//!     "type": "plugin",
//!     "dependencies": ["https://github.com/acme/logger.git@v2"],
//!     "requirements": ["python>=3.10"],
//!     "config_template": { "level": "info" },
//!     "refresh": { "command": "./refresh.sh", "timeout_secs": 60 }
//! }
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModmanError, Result};
use crate::source::ModuleSource;

/// Descriptor file name at the root of every module repository.
pub const DESCRIPTOR_FILE: &str = "module.json";

/// Discovery metadata file stamped into a module directory at install time.
pub const METADATA_FILE: &str = ".modman.json";

/// The category of a module, which also decides its install directory.
///
/// Any value outside these four is a validation error, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    /// Orchestration modules living under `managers/`.
    Manager,
    /// Feature modules living under `plugins/`.
    Plugin,
    /// Shared helpers living under `utils/`.
    Util,
    /// Model-context-protocol servers living under `mcp/`.
    Mcp,
}

impl ModuleType {
    /// All valid module types, in directory-scan order.
    pub fn all() -> [ModuleType; 4] {
        [
            ModuleType::Manager,
            ModuleType::Plugin,
            ModuleType::Util,
            ModuleType::Mcp,
        ]
    }

    /// Directory name for this type's install category.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ModuleType::Manager => "managers",
            ModuleType::Plugin => "plugins",
            ModuleType::Util => "utils",
            ModuleType::Mcp => "mcp",
        }
    }

    /// Parse a declared type value, or `None` for anything unrecognized.
    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "manager" => Some(ModuleType::Manager),
            "plugin" => Some(ModuleType::Plugin),
            "util" => Some(ModuleType::Util),
            "mcp" => Some(ModuleType::Mcp),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleType::Manager => "manager",
            ModuleType::Plugin => "plugin",
            ModuleType::Util => "util",
            ModuleType::Mcp => "mcp",
        };
        write!(f, "{}", s)
    }
}

/// Declared refresh capability: an entry point run with the module's own
/// directory as its working scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSpec {
    /// Shell command to invoke.
    pub command: String,
    /// Timeout in seconds for the refresh command.
    #[serde(default = "default_refresh_timeout")]
    pub timeout_secs: u64,
}

fn default_refresh_timeout() -> u64 {
    120
}

/// Raw `module.json` contents before type validation.
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    version: String,
    #[serde(rename = "type")]
    module_type: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    requirements: Vec<String>,
    #[serde(default)]
    config_template: Option<serde_json::Value>,
    #[serde(default)]
    refresh: Option<RefreshSpec>,
}

/// Parsed metadata for one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Unique name, derived from the source reference.
    pub name: String,
    /// Module category.
    pub module_type: ModuleType,
    /// The source reference this module was resolved from.
    pub source: ModuleSource,
    /// Declared version string.
    pub version: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Source references of this module's dependencies. Order is preserved
    /// for diagnostics but carries no semantic weight.
    pub dependencies: Vec<ModuleSource>,
    /// Opaque requirement strings, passed through unmodified.
    pub requirements: Vec<String>,
    /// Optional nested default-configuration mapping.
    pub config_template: Option<serde_json::Value>,
    /// Optional refresh capability.
    pub refresh: Option<RefreshSpec>,
}

impl ModuleDescriptor {
    /// Load and validate a descriptor from a module directory.
    ///
    /// # Errors
    /// - `ModmanError::Descriptor` if `module.json` is missing or malformed
    /// - `ModmanError::InvalidModuleType` if the declared type is not one of
    ///   the four valid values
    /// - `ModmanError::ManifestParse` if a dependency reference is malformed
    pub fn load(dir: &Path, source: ModuleSource) -> Result<Self> {
        let descriptor_path = dir.join(DESCRIPTOR_FILE);
        if !descriptor_path.exists() {
            return Err(ModmanError::Descriptor(format!(
                "No {} found in {}",
                DESCRIPTOR_FILE,
                dir.display()
            )));
        }

        let content = fs::read_to_string(&descriptor_path).map_err(|e| {
            ModmanError::Descriptor(format!(
                "Failed to read {}: {}",
                descriptor_path.display(),
                e
            ))
        })?;

        let raw: RawDescriptor = serde_json::from_str(&content).map_err(|e| {
            ModmanError::Descriptor(format!(
                "Malformed {} in {}: {}",
                DESCRIPTOR_FILE,
                dir.display(),
                e
            ))
        })?;

        let name = source.name().to_string();
        let module_type = ModuleType::from_value(&raw.module_type).ok_or_else(|| {
            ModmanError::InvalidModuleType {
                module: name.clone(),
                value: raw.module_type.clone(),
            }
        })?;

        let dependencies = raw
            .dependencies
            .iter()
            .map(|r| ModuleSource::parse(r))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            module_type,
            source,
            version: raw.version,
            description: raw.description,
            dependencies,
            requirements: raw.requirements,
            config_template: raw.config_template,
            refresh: raw.refresh,
        })
    }

    /// Whether this module exposes refresh behavior.
    pub fn has_refresh(&self) -> bool {
        self.refresh.is_some()
    }
}

/// Discovery metadata stamped into a module directory at install time and
/// read back when the registry scans the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Module name, for registry indexing and listing.
    pub name: String,
    /// The source reference the module was installed from.
    pub source: ModuleSource,
}

impl ModuleMetadata {
    /// Read discovery metadata from a module directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(METADATA_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            ModmanError::Descriptor(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write discovery metadata into a module directory.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(METADATA_FILE), content)?;
        Ok(())
    }
}
