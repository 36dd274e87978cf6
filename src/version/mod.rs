// src/version/mod.rs

//! Package versions and version-range selectors
//!
//! Versions use the `[epoch:]version[-release]` form. Selectors accept
//! `>=`, `<=`, `>`, `<`, `!=`, `=` (or a bare version for an exact match),
//! `*` for any version, and two comma-separated constraints for a range
//! such as `>= 1.0, < 2.0`.

use crate::error::{Error, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed package version with epoch, version, and release components
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl PackageVersion {
    /// Parse a version string
    ///
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1.2.3-4" → epoch=0, version="1.2.3", release=Some("4")
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (epoch_str, rest) = match s.split_once(':') {
            Some((e, r)) => (e, r),
            None => ("0", s),
        };

        let epoch = if epoch_str.is_empty() {
            0
        } else {
            epoch_str
                .parse::<u64>()
                .map_err(|e| Error::Parse(format!("invalid epoch in version '{}': {}", s, e)))?
        };

        let (version, release) = match rest.split_once('-') {
            Some((v, r)) => (v.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };

        if version.is_empty() || version.contains(char::is_whitespace) {
            return Err(Error::Parse(format!("invalid version component in '{}'", s)));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Normalize to semver for ordering
    ///
    /// Versions that are not semver-compliant compare by their leading
    /// numeric components; missing components count as zero.
    fn to_semver(&self) -> Version {
        if let Ok(v) = Version::parse(&self.version) {
            return v;
        }

        let mut parts = self.version.split('.').map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().unwrap_or(0)
        });
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);

        Version::new(major, minor, patch)
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.to_semver().cmp(&other.to_semver()))
            // Keeps "1.0" and "1.0.0" distinct so ordering agrees with equality
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.release.cmp(&other.release))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageVersion {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<PackageVersion> for String {
    fn from(v: PackageVersion) -> Self {
        v.to_string()
    }
}

/// Version range selector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum VersionSelector {
    /// Any version is acceptable
    #[default]
    Any,
    Exact(PackageVersion),
    GreaterThan(PackageVersion),
    GreaterOrEqual(PackageVersion),
    LessThan(PackageVersion),
    LessOrEqual(PackageVersion),
    NotEqual(PackageVersion),
    /// Both selectors must be satisfied (ranges like ">= 1.0, < 2.0")
    And(Box<VersionSelector>, Box<VersionSelector>),
}

impl VersionSelector {
    /// Parse a selector string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(Self::Any);
        }

        if let Some((left, right)) = s.split_once(',') {
            let left = Self::parse(left)?;
            let right = Self::parse(right)?;
            return Ok(Self::And(Box::new(left), Box::new(right)));
        }

        let (ctor, rest): (fn(PackageVersion) -> Self, &str) =
            if let Some(rest) = s.strip_prefix(">=") {
                (Self::GreaterOrEqual, rest)
            } else if let Some(rest) = s.strip_prefix("<=") {
                (Self::LessOrEqual, rest)
            } else if let Some(rest) = s.strip_prefix("!=") {
                (Self::NotEqual, rest)
            } else if let Some(rest) = s.strip_prefix('>') {
                (Self::GreaterThan, rest)
            } else if let Some(rest) = s.strip_prefix('<') {
                (Self::LessThan, rest)
            } else if let Some(rest) = s.strip_prefix('=') {
                (Self::Exact, rest.strip_prefix('=').unwrap_or(rest))
            } else {
                (Self::Exact, s)
            };

        Ok(ctor(PackageVersion::parse(rest)?))
    }

    /// Check if a version satisfies this selector
    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(v) => version == v,
            Self::GreaterThan(v) => version > v,
            Self::GreaterOrEqual(v) => version >= v,
            Self::LessThan(v) => version < v,
            Self::LessOrEqual(v) => version <= v,
            Self::NotEqual(v) => version != v,
            Self::And(left, right) => left.satisfies(version) && right.satisfies(version),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(v) => write!(f, "= {}", v),
            Self::GreaterThan(v) => write!(f, "> {}", v),
            Self::GreaterOrEqual(v) => write!(f, ">= {}", v),
            Self::LessThan(v) => write!(f, "< {}", v),
            Self::LessOrEqual(v) => write!(f, "<= {}", v),
            Self::NotEqual(v) => write!(f, "!= {}", v),
            Self::And(left, right) => write!(f, "{}, {}", left, right),
        }
    }
}
