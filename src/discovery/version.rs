//! HAProxy version representation and capability derivation.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A HAProxy/Dataplane version, ordered by `(major, minor)` only. Two
/// versions with the same major/minor but different patch/build strings
/// compare equal for admission purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub full: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, full: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            full: full.into(),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl FromStr for Version {
    type Err = String;

    /// Parses `"major.minor[.patch][-suffix]"`, e.g. `"3.2.1"` or
    /// `"2.9.0-hapee"`. Only the leading `major.minor` pair is load-bearing
    /// for ordering; the whole input is preserved as `full`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let major = parts
            .next()
            .ok_or_else(|| format!("missing major version in '{s}'"))?
            .parse::<u32>()
            .map_err(|e| format!("invalid major version in '{s}': {e}"))?;
        let minor = parts
            .next()
            .ok_or_else(|| format!("missing minor version in '{s}'"))?
            .trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.')
            .parse::<u32>()
            .map_err(|e| format!("invalid minor version in '{s}': {e}"))?;
        Ok(Version::new(major, minor, s.to_string()))
    }
}

/// Boolean feature flags derived deterministically from a [`Version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_crt_list: bool,
    pub supports_map_storage: bool,
    pub supports_runtime_maps: bool,
    pub is_enterprise: bool,
}

impl Capabilities {
    /// Pure function of a [`Version`]; two calls with equal versions always
    /// produce equal capabilities.
    pub fn for_version(version: &Version) -> Self {
        let pair = (version.major, version.minor);
        Capabilities {
            supports_crt_list: pair >= (3, 2),
            supports_map_storage: pair >= (2, 4),
            supports_runtime_maps: pair >= (2, 0),
            is_enterprise: version.full.to_ascii_lowercase().contains("hapee")
                || version.full.to_ascii_lowercase().contains("enterprise"),
        }
    }

    /// Render as a string-keyed map for the template context (`capabilities.supports_*`).
    pub fn as_context_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("supports_crt_list".into(), self.supports_crt_list.into());
        map.insert(
            "supports_map_storage".into(),
            self.supports_map_storage.into(),
        );
        map.insert(
            "supports_runtime_maps".into(),
            self.supports_runtime_maps.into(),
        );
        map.insert("is_enterprise".into(), self.is_enterprise.into());
        map
    }
}
