//! Version tokens and the `<token>_<label>` naming scheme.
//!
//! A [Version] is the numeric token at the front of every script name. It is the only
//! thing that orders migrations; the human-readable label never takes part in a comparison.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The sortable token identifying one schema change unit.
///
/// Tokens are generated from Unix seconds, so they compare numerically rather than
/// as strings: `999` sorts before `1000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub const fn new(token: u64) -> Self {
        Self(token)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Parses either a bare token (`1000`) or a full identifier (`1000_create_users`).
/// The label part, if present, is ignored.
impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().split('_').next().unwrap_or_default();
        parse_token(token, s)
    }
}

fn parse_token(token: &str, name: &str) -> Result<Version, Error> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedName {
            name: name.to_string(),
            reason: format!("version token '{}' is not a non-negative integer", token),
        });
    }
    token
        .parse::<u64>()
        .map(Version)
        .map_err(|e| Error::MalformedName {
            name: name.to_string(),
            reason: format!("version token '{}' is out of range: {}", token, e),
        })
}

/// A version token together with its label, as found in `<token>_<label>.<up|down>.sql`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier {
    pub version: Version,
    pub label: String,
}

impl Identifier {
    /// Extract the identifier from a script name by splitting on the first `_`.
    /// Everything from the first `.` after the separator is treated as the extension.
    pub fn parse(script_name: &str) -> Result<Self, Error> {
        let (token, rest) = script_name
            .split_once('_')
            .ok_or_else(|| Error::MalformedName {
                name: script_name.to_string(),
                reason: "expected '<version>_<label>', no '_' separator found".to_string(),
            })?;
        let version = parse_token(token, script_name)?;
        let label = rest.split('.').next().unwrap_or_default();
        if label.is_empty() {
            return Err(Error::MalformedName {
                name: script_name.to_string(),
                reason: "label must not be empty".to_string(),
            });
        }
        Ok(Self {
            version,
            label: label.to_string(),
        })
    }

    /// Generate a new identifier from the current time.
    ///
    /// Fails with [Error::DuplicateVersion] if the generated token is already used by
    /// one of `existing`.
    pub fn generate(label: &str, existing: &[Version]) -> Result<Self, Error> {
        Self::generate_at(Utc::now(), label, existing)
    }

    pub fn generate_at(
        now: DateTime<Utc>,
        label: &str,
        existing: &[Version],
    ) -> Result<Self, Error> {
        let label = normalize_label(label)?;
        let seconds = u64::try_from(now.timestamp()).map_err(|_| {
            Error::Generic(format!("cannot derive a version from timestamp {}", now))
        })?;
        let version = Version(seconds);
        if existing.contains(&version) {
            return Err(Error::DuplicateVersion(version));
        }
        Ok(Self { version, label })
    }

    /// `<token>_<label>`, the stem shared by the Up and Down file names.
    pub fn stem(&self) -> String {
        format!("{}_{}", self.version, self.label)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

/// Turn user input into a label usable in a file name: runs of whitespace become `_`.
pub fn normalize_label(label: &str) -> Result<String, Error> {
    let normalized = label.split_whitespace().collect::<Vec<_>>().join("_");
    if normalized.is_empty() {
        return Err(Error::MalformedName {
            name: label.to_string(),
            reason: "migration label can't be empty".to_string(),
        });
    }
    if let Some(bad) = normalized
        .chars()
        .find(|c| matches!(c, '.' | '/' | '\\'))
    {
        return Err(Error::MalformedName {
            name: label.to_string(),
            reason: format!("label must not contain '{}'", bad),
        });
    }
    Ok(normalized)
}

/// Anything carrying a [Version], so [sort_by_version] can order tokens, identifiers and scripts.
pub trait Versioned {
    fn version(&self) -> Version;
}

impl Versioned for Version {
    fn version(&self) -> Version {
        *self
    }
}

impl Versioned for Identifier {
    fn version(&self) -> Version {
        self.version
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Numeric comparison of two versions. Labels are never consulted.
pub fn compare<A: Versioned, B: Versioned>(a: &A, b: &B) -> Ordering {
    a.version().cmp(&b.version())
}

/// Stable sort by version in the requested order.
pub fn sort_by_version<T: Versioned>(order: SortOrder, items: &mut [T]) {
    match order {
        SortOrder::Ascending => items.sort_by(|a, b| compare(a, b)),
        SortOrder::Descending => items.sort_by(|a, b| compare(b, a)),
    }
}
