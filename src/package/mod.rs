// src/package/mod.rs

//! Package identities and selectors
//!
//! A [`Package`] is a concrete (category, name, version) triple with its
//! `requires`/`conflicts`/`provides` relations. A [`PackageSelector`] is a
//! version-range query over one category/name that resolves to zero or more
//! concrete packages through a [`PackageCatalog`].
//!
//! # Fingerprints
//!
//! The fingerprint is the unique, stable key of a concrete package:
//!
//! ```text
//! <category>/<name>@<version>     e.g. "net/curl@8.5.0-1"
//! <name>@<version>                when the package has no category
//! ```

pub mod catalog;

pub use catalog::{InMemoryCatalog, PackageCatalog};

use crate::error::{Error, Result};
use crate::version::{PackageVersion, VersionSelector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A concrete package known to a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    pub version: PackageVersion,
    /// Runtime and build requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<PackageSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<PackageSelector>,
    /// Virtual identities this package stands in for
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<PackageSelector>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Package {
    /// Create a package without relations
    pub fn new(category: &str, name: &str, version: PackageVersion) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            version,
            requires: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// Create a package, parsing its version
    pub fn parse(category: &str, name: &str, version: &str) -> Result<Self> {
        Ok(Self::new(category, name, PackageVersion::parse(version)?))
    }

    pub fn with_requires(mut self, requires: Vec<PackageSelector>) -> Self {
        self.requires = requires;
        self
    }

    pub fn with_conflicts(mut self, conflicts: Vec<PackageSelector>) -> Self {
        self.conflicts = conflicts;
        self
    }

    pub fn with_provides(mut self, provides: Vec<PackageSelector>) -> Self {
        self.provides = provides;
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// The `category/name` key shared by every version of this package
    pub fn key(&self) -> String {
        identity_key(&self.category, &self.name)
    }

    /// Unique key of this concrete package
    pub fn fingerprint(&self) -> String {
        format!("{}@{}", self.key(), self.version)
    }

    /// A selector matching exactly this package
    pub fn selector(&self) -> PackageSelector {
        PackageSelector {
            category: self.category.clone(),
            name: self.name.clone(),
            constraint: VersionSelector::Exact(self.version.clone()),
        }
    }

    /// Whether this package itself is selected by `selector`
    pub fn matches(&self, selector: &PackageSelector) -> bool {
        self.category == selector.category
            && self.name == selector.name
            && selector.constraint.satisfies(&self.version)
    }

    /// Whether one of this package's `provides` entries answers `selector`
    ///
    /// A provide with an exact version must satisfy the selector's range; a
    /// provide without one answers every range on its name.
    pub fn provides_for(&self, selector: &PackageSelector) -> bool {
        self.provides.iter().any(|provided| {
            provided.category == selector.category
                && provided.name == selector.name
                && match &provided.constraint {
                    VersionSelector::Exact(v) => selector.constraint.satisfies(v),
                    _ => true,
                }
        })
    }

    /// Whether this package answers `selector` directly or through `provides`
    pub fn satisfies(&self, selector: &PackageSelector) -> bool {
        self.matches(selector) || self.provides_for(selector)
    }

    /// Whether any requirement of this package is answered by `other`
    pub fn depends_on(&self, other: &Package) -> bool {
        self.requires.iter().any(|req| other.satisfies(req))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}

fn identity_key(category: &str, name: &str) -> String {
    if category.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", category, name)
    }
}

/// A version-range query over one category/name
///
/// String forms:
/// - `curl` → any version of `curl`
/// - `net/curl >= 8.0, < 9.0` → range within category `net`
/// - `net/curl@8.5.0` → exact version (fingerprint form)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageSelector {
    pub category: String,
    pub name: String,
    pub constraint: VersionSelector,
}

impl PackageSelector {
    pub fn new(category: &str, name: &str, constraint: VersionSelector) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            constraint,
        }
    }

    /// Any version of `category/name`
    pub fn any(category: &str, name: &str) -> Self {
        Self::new(category, name, VersionSelector::Any)
    }

    /// Parse the string form of a selector
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '=' | '!' | '@'))
            .unwrap_or(s.len());
        let (identity, rest) = s.split_at(split);

        let (category, name) = match identity.rsplit_once('/') {
            Some((category, name)) => (category, name),
            None => ("", identity),
        };
        if name.is_empty() {
            return Err(Error::Parse(format!("missing package name in selector '{}'", s)));
        }

        let constraint = match rest.strip_prefix('@') {
            Some(version) => VersionSelector::Exact(PackageVersion::parse(version)?),
            None => VersionSelector::parse(rest)?,
        };

        Ok(Self::new(category, name, constraint))
    }

    /// The `category/name` key this selector queries
    pub fn key(&self) -> String {
        identity_key(&self.category, &self.name)
    }
}

impl fmt::Display for PackageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            VersionSelector::Any => write!(f, "{}", self.key()),
            constraint => write!(f, "{} {}", self.key(), constraint),
        }
    }
}

impl FromStr for PackageSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageSelector {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<PackageSelector> for String {
    fn from(s: PackageSelector) -> Self {
        s.to_string()
    }
}
