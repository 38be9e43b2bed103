//! Unicode version strings
//!
//! Versions are dotted numbers (`"16.0.0"`, `"3.2"`). From a configurable
//! threshold onwards the remote layout nests files under a `ucd/` folder.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// First version whose remote layout has the `ucd/` subfolder.
pub const DEFAULT_UCD_FOLDER_THRESHOLD: &str = "4.1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnicodeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl UnicodeVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor, patch })
    }
}

impl PartialOrd for UnicodeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UnicodeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for UnicodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for UnicodeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid unicode version: {}", s))
    }
}

impl TryFrom<String> for UnicodeVersion {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<UnicodeVersion> for String {
    fn from(v: UnicodeVersion) -> Self {
        v.to_string()
    }
}

impl Default for UnicodeVersion {
    fn default() -> Self {
        Self::new(4, 1, 0)
    }
}

/// Whether the remote layout of `version` has the `ucd/` folder.
///
/// Unparseable versions are treated as modern.
pub fn has_ucd_folder(version: &str, threshold: UnicodeVersion) -> bool {
    UnicodeVersion::parse(version).map_or(true, |v| v >= threshold)
}

/// The dataset API path for a file of a version.
pub fn remote_file_path(version: &str, path: &str, threshold: UnicodeVersion) -> String {
    let path = path.trim_start_matches('/');
    if has_ucd_folder(version, threshold) {
        format!("{}/ucd/{}", version, path)
    } else {
        format!("{}/{}", version, path)
    }
}

/// Sort version strings newest first; unparseable ones go last.
pub fn sort_versions_desc(versions: &mut [String]) {
    versions.sort_by(|a, b| match (UnicodeVersion::parse(a), UnicodeVersion::parse(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    });
}
