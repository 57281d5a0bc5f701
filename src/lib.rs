//! Modman - Git-backed project module manager

pub mod cli;
pub mod error;
pub mod fetch;
pub mod installer;
pub mod manifest;
pub mod merge;
pub mod module;
pub mod refresher;
pub mod resolver;
pub mod source;

pub use error::{ModmanError, Result};
