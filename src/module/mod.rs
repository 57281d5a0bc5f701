//! Module model for Modman
//!
//! A module is an independently-versioned, git-hosted unit of functionality
//! installed into one of four per-type project directories. This module
//! provides the descriptor types parsed from a module's on-disk metadata and
//! the registry indexing every installed module.
//!
//! # Architecture
//!
//! - **types**: Core data structures (`ModuleDescriptor`, `ModuleType`,
//!   `RefreshSpec`, `ModuleMetadata`) and descriptor-file parsing
//! - **registry**: The installed-module index with conflict detection,
//!   built by scanning the per-type directories
//!
//! # Project Directory Structure
//!
//! ```text
//! project/
//! ├── modman.json
//! ├── managers/
//! │   └── core/
//! │       ├── module.json
//! │       └── .modman.json
//! ├── plugins/
//! │   └── logger/
//! │       ├── module.json
//! │       └── .modman.json
//! ├── utils/
//! └── mcp/
//! ```

pub mod registry;
pub mod types;

pub use registry::{ensure_layout, ModuleRecord, ModuleRegistry};
pub use types::{
    ModuleDescriptor, ModuleMetadata, ModuleType, RefreshSpec, DESCRIPTOR_FILE, METADATA_FILE,
};
