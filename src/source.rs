//! Module source references.
//!
//! A source reference is a git URL with an optional revision pin, written
//! `url[@revision]`. The module name is derived from the final path segment
//! of the URL with a trailing `.git` stripped, so two references to the same
//! repository always derive the same name.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ModmanError, Result};

/// A git-hosted module source with an optional revision pin.
///
/// Two sources are equal only if both URL and revision match; equality is
/// what the resolver uses to distinguish a harmless duplicate reference
/// from a version conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleSource {
    /// Repository URL (https or scp-style ssh).
    url: String,
    /// Optional revision pin (tag, branch, or commit).
    revision: Option<String>,
    /// Module name derived from the URL at parse time.
    name: String,
}

impl ModuleSource {
    /// Parse a source reference of the form `url[@revision]`.
    ///
    /// The revision separator is only recognized after the last `/`, so
    /// scp-style URLs like `git@host:org/repo.git` parse as unpinned.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ModmanError::ManifestParse(
                "Empty module source reference".to_string(),
            ));
        }

        let last_slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (url, revision) = match reference[last_slash..].find('@') {
            Some(at) => {
                let split = last_slash + at;
                let rev = reference[split + 1..].trim();
                if rev.is_empty() {
                    return Err(ModmanError::ManifestParse(format!(
                        "Empty revision pin in source reference '{}'",
                        reference
                    )));
                }
                (&reference[..split], Some(rev.to_string()))
            }
            None => (reference, None),
        };

        let name = derive_name(url)?;
        Ok(Self {
            url: url.to_string(),
            revision,
            name,
        })
    }

    /// Repository URL without the revision pin.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Optional revision pin (tag, branch, or commit).
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Module name derived from the URL.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Derive the module name from a URL: final path segment, `.git` stripped.
fn derive_name(url: &str) -> Result<String> {
    let tail = url
        .rsplit(['/', ':'])
        .next()
        .unwrap_or("")
        .trim_end_matches(".git");

    let name_re = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._\-]{0,63}$").unwrap();
    if !name_re.is_match(tail) {
        return Err(ModmanError::ManifestParse(format!(
            "Cannot derive a valid module name from source '{}'",
            url
        )));
    }
    Ok(tail.to_string())
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}@{}", self.url, rev),
            None => write!(f, "{}", self.url),
        }
    }
}

impl FromStr for ModuleSource {
    type Err = ModmanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModuleSource {
    type Error = ModmanError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ModuleSource> for String {
    fn from(source: ModuleSource) -> Self {
        source.to_string()
    }
}
