//! Semantic version parsing and ordering for release feeds.
//!
//! Release names published by the update feed follow the
//! `[v]MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]` scheme. This module parses them
//! into an immutable [`Version`] and defines the precedence rules used to decide
//! whether an update applies.
//!
//! # Parsing Rules
//!
//! - An optional leading `v` is accepted and dropped
//! - `MAJOR`, `MINOR` and `PATCH` are required, digits only, without leading zeros
//! - Prerelease and build identifiers are dot-separated, non-empty, and limited to
//!   `[A-Za-z0-9-]`
//! - Numeric prerelease identifiers carry no leading zeros
//! - When a `+` appears before any `-` after `PATCH`, every `-` that follows belongs
//!   to build metadata (`1.0.0+build-7` has no prerelease)
//!
//! # Precedence
//!
//! Versions are totally ordered, build metadata excluded:
//!
//! 1. `major`, `minor`, `patch` compare numerically
//! 2. A release outranks any prerelease of the same numeric version
//! 3. Prerelease identifiers compare pairwise: numeric by magnitude, alphanumeric
//!   lexically (ASCII), numeric always below alphanumeric
//! 4. When every shared identifier is equal, the shorter prerelease is lower
//!
//! # Examples
//!
//! ```rust
//! use nvmw_cli::version::Version;
//!
//! let current: Version = "1.1.11".parse().unwrap();
//! let latest: Version = "v1.2.0-rc.2".parse().unwrap();
//! assert!(latest > current);
//! assert_eq!(latest.to_string(), "1.2.0-rc.2");
//! ```

mod comparison;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Reasons a version string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,

    #[error("no MAJOR.MINOR.PATCH elements found in '{0}'")]
    MissingComponents(String),

    #[error("invalid character(s) in {field} number '{value}'")]
    InvalidNumber {
        field: &'static str,
        value: String,
    },

    #[error("{field} number must not contain leading zeroes: '{value}'")]
    LeadingZero {
        field: &'static str,
        value: String,
    },

    #[error("{field} number '{value}' is out of range")]
    Overflow {
        field: &'static str,
        value: String,
    },

    #[error("prerelease identifier '{0}' is empty or contains invalid characters")]
    InvalidPrerelease(String),

    #[error("build metadata '{0}' is empty or contains invalid characters")]
    InvalidBuild(String),
}

/// One dot-separated prerelease component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Digits only, compared by magnitude.
    Numeric(u64),
    /// Anything containing a letter or hyphen, compared lexically.
    AlphaNumeric(String),
}

impl Identifier {
    fn parse(raw: &str) -> Result<Self, VersionError> {
        if raw.is_empty() || !is_identifier_text(raw) {
            return Err(VersionError::InvalidPrerelease(raw.to_string()));
        }

        if raw.bytes().all(|b| b.is_ascii_digit()) {
            if raw.len() > 1 && raw.starts_with('0') {
                return Err(VersionError::LeadingZero {
                    field: "prerelease",
                    value: raw.to_string(),
                });
            }
            return raw.parse::<u64>().map(Identifier::Numeric).map_err(|_| {
                VersionError::Overflow {
                    field: "prerelease",
                    value: raw.to_string(),
                }
            });
        }

        Ok(Identifier::AlphaNumeric(raw.to_string()))
    }

    /// Whether this identifier is the numeric variant.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Identifier::Numeric(_))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{n}"),
            Identifier::AlphaNumeric(s) => f.write_str(s),
        }
    }
}

/// A parsed semantic version.
///
/// Equality and hashing follow precedence, so `1.0.0+a == 1.0.0+b`.
#[derive(Debug, Clone)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Vec<Identifier>,
    build: Vec<String>,
}

impl Version {
    /// A release version with no prerelease or build metadata.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Parse a version string, accepting an optional leading `v`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let text = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if text.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut parts = text.splitn(3, '.');
        let (Some(major), Some(minor), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(VersionError::MissingComponents(input.to_string()));
        };

        let major = parse_number("major", major)?;
        let minor = parse_number("minor", minor)?;

        // A '+' ahead of the first '-' means there is no prerelease at all.
        let plus = rest.find('+');
        let dash = rest.find('-').filter(|&dash| plus.is_none_or(|plus| dash < plus));

        let patch_end = dash.or(plus).unwrap_or(rest.len());
        let patch = parse_number("patch", &rest[..patch_end])?;

        let pre = match dash {
            Some(start) => {
                let end = plus.unwrap_or(rest.len());
                rest[start + 1..end]
                    .split('.')
                    .map(Identifier::parse)
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => Vec::new(),
        };

        let build = match plus {
            Some(start) => rest[start + 1..]
                .split('.')
                .map(|part| {
                    if part.is_empty() || !is_identifier_text(part) {
                        Err(VersionError::InvalidBuild(part.to_string()))
                    } else {
                        Ok(part.to_string())
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre,
            build,
        })
    }

    #[must_use]
    pub const fn major(&self) -> u64 {
        self.major
    }

    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.minor
    }

    #[must_use]
    pub const fn patch(&self) -> u64 {
        self.patch
    }

    /// Prerelease identifiers in declaration order.
    #[must_use]
    pub fn prerelease(&self) -> &[Identifier] {
        &self.pre
    }

    /// Build metadata, ignored by every comparison.
    #[must_use]
    pub fn build(&self) -> &[String] {
        &self.build
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

fn parse_number(field: &'static str, raw: &str) -> Result<u64, VersionError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::InvalidNumber {
            field,
            value: raw.to_string(),
        });
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return Err(VersionError::LeadingZero {
            field,
            value: raw.to_string(),
        });
    }
    raw.parse().map_err(|_| VersionError::Overflow {
        field,
        value: raw.to_string(),
    })
}

fn is_identifier_text(raw: &str) -> bool {
    raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            f.write_str("-")?;
            for (i, id) in self.pre.iter().enumerate() {
                if i > 0 {
                    f.write_str(".")?;
                }
                write!(f, "{id}")?;
            }
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.pre.hash(state);
    }
}

impl serde::Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!((v.major(), v.minor(), v.patch()), (1, 2, 3));
        assert!(v.prerelease().is_empty());
        assert!(v.build().is_empty());
    }

    #[test]
    fn test_parse_strips_v_prefix() {
        let v = Version::parse("v1.1.12").unwrap();
        assert_eq!(v.to_string(), "1.1.12");
    }

    #[test]
    fn test_parse_prerelease_and_build() {
        let v = Version::parse("2.0.0-rc.1.beta-2+exp.sha.5114f85").unwrap();
        assert_eq!(
            v.prerelease(),
            &[
                Identifier::AlphaNumeric("rc".into()),
                Identifier::Numeric(1),
                Identifier::AlphaNumeric("beta-2".into()),
            ]
        );
        assert_eq!(v.build(), &["exp", "sha", "5114f85"]);
    }

    #[test]
    fn test_build_before_dash_is_all_build() {
        let v = Version::parse("1.0.0+build-7.x-1").unwrap();
        assert!(!v.is_prerelease());
        assert_eq!(v.build(), &["build-7", "x-1"]);
        assert_eq!(v.to_string(), "1.0.0+build-7.x-1");
    }

    #[test]
    fn test_round_trip_canonical_strings() {
        for s in [
            "0.0.0",
            "1.2.3",
            "10.20.30",
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-0.3.7",
            "1.0.0-x.7.z.92",
            "1.0.0-x-y-z.--",
            "1.0.0+20130313144700",
            "1.0.0-beta+exp.sha.5114f85",
            "1.0.0+21AF26D3----117B344092BD",
        ] {
            assert_eq!(Version::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_rejects_leading_zero() {
        assert!(matches!(
            Version::parse("1.02.3"),
            Err(VersionError::LeadingZero { field: "minor", .. })
        ));
        assert!(matches!(
            Version::parse("1.2.3-rc.01"),
            Err(VersionError::LeadingZero { field: "prerelease", .. })
        ));
    }

    #[test]
    fn test_rejects_missing_patch() {
        assert!(matches!(Version::parse("1.2"), Err(VersionError::MissingComponents(_))));
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        assert_eq!(Version::parse("v"), Err(VersionError::Empty));
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        for bad in [
            "a.b.c",
            "1.2.3-",
            "1.2.3-alpha..1",
            "1.2.3+",
            "1.2.3+meta..x",
            "1.2.3-al$pha",
            "1.2.3.4",
            "1.-2.3",
            "99999999999999999999.0.0",
        ] {
            assert!(Version::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_equality_ignores_build() {
        let a = Version::parse("1.0.0+a").unwrap();
        let b = Version::parse("1.0.0+b").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_as_string() {
        let v: Version = serde_json::from_str("\"v1.1.12\"").unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.1.12\"");
    }
}
