//! Error types for Modman
//!
//! This module defines all error types used throughout the module manager.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Graph-level errors (manifest parse, cycles, version conflicts) abort a
//! whole resolution pass. Module-scoped errors (clone failures, invalid
//! types, destination conflicts, refresh failures) are recorded in run
//! reports and never abort sibling modules.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for Modman operations.
#[derive(Error, Debug)]
pub enum ModmanError {
    /// The project manifest is missing or malformed. Fatal.
    #[error("Manifest error: {0}")]
    ManifestParse(String),

    /// The dependency graph contains a cycle. Fatal to resolution.
    /// The cycle lists module names in discovery order, closed on the
    /// repeated module.
    #[error("Cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Module names forming the cycle.
        cycle: Vec<String>,
    },

    /// Two distinct sources claim the same module name. Fatal to resolution;
    /// the resolver never silently picks a winner.
    #[error("Version conflict for module '{name}': '{existing}' vs '{requested}'")]
    VersionConflict {
        /// The contested module name.
        name: String,
        /// Source reference seen first.
        existing: String,
        /// Conflicting source reference seen later.
        requested: String,
    },

    /// Fetching a module's repository failed. Scoped to one module.
    #[error("Clone failed for '{module}': {reason}")]
    CloneFailure {
        /// The module whose fetch failed.
        module: String,
        /// Proximate cause (git stderr, timeout, spawn error).
        reason: String,
    },

    /// A module declared a type outside {manager, plugin, util, mcp}.
    /// Scoped to one module.
    #[error("Invalid module type '{value}' for module '{module}'")]
    InvalidModuleType {
        /// The offending module.
        module: String,
        /// The declared type value.
        value: String,
    },

    /// A different installation already occupies the module's destination.
    /// Scoped to one module; the existing installation is left untouched.
    #[error("Destination conflict for '{module}': {} is already occupied", .path.display())]
    DestinationConflict {
        /// The module that could not be committed.
        module: String,
        /// The contested destination path.
        path: PathBuf,
    },

    /// A module's refresh command failed. Scoped to one module.
    #[error("Refresh failed for '{module}': {reason}")]
    RefreshFailure {
        /// The module whose refresh failed.
        module: String,
        /// Captured fault (exit status, stderr, timeout).
        reason: String,
    },

    /// Two modules claimed the same config namespace with different shapes.
    /// Fatal to the merge pass only.
    #[error("Config merge conflict in namespace '{namespace}'")]
    MergeConflict {
        /// The contested namespace key.
        namespace: String,
    },

    /// A module descriptor file is missing or malformed.
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// Resource not found (modules, manifest entries, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for Modman operations.
pub type Result<T> = std::result::Result<T, ModmanError>;

impl ModmanError {
    /// Whether this error aborts a whole resolution pass, as opposed to
    /// being recordable against a single module in a run report.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ModmanError::ManifestParse(_)
                | ModmanError::CyclicDependency { .. }
                | ModmanError::VersionConflict { .. }
        )
    }
}
