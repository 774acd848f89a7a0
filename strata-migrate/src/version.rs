//! Migration versions and target versions.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MigrationError, StrataResult};

/// A dot-separated numeric migration version such as `1.2.3`.
///
/// Versions compare component by component. Trailing zero components are
/// dropped during parsing, so `1.0` and `1` are the same version, while a
/// shorter prefix sorts before a longer one (`1` < `1.1`). `_` is accepted as
/// a separator so that file names like `V1_1__add_users.sql` parse naturally.
#[derive(Clone)]
pub struct MigrationVersion {
    components: Vec<u64>,
    text: String,
}

impl MigrationVersion {
    /// The version of an empty schema. Sorts before every real version.
    pub fn empty() -> Self {
        Self {
            components: Vec::new(),
            text: "<< Empty Schema >>".to_string(),
        }
    }

    /// Parse a version string.
    pub fn parse(input: &str) -> StrataResult<Self> {
        let text = input.trim().replace('_', ".");
        if text.is_empty() {
            return Err(MigrationError::InvalidVersion(input.to_string()));
        }

        let mut components = text
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| MigrationError::InvalidVersion(input.to_string()))
            })
            .collect::<StrataResult<Vec<_>>>()?;

        while components.len() > 1 && components.last() == Some(&0) {
            components.pop();
        }

        Ok(Self { components, text })
    }

    /// Numeric components after normalization.
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Check if this is the empty-schema version.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The major (first) component, or zero for the empty version.
    pub fn major(&self) -> u64 {
        self.components.first().copied().unwrap_or(0)
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for MigrationVersion {}

impl Hash for MigrationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MigrationVersion({})", self.text)
    }
}

impl FromStr for MigrationVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MigrationVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for MigrationVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// The version a migrate run should stop at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TargetVersion {
    /// Apply everything available.
    #[default]
    Latest,
    /// Stay at the currently applied version.
    Current,
    /// Apply only the next pending version.
    Next,
    /// Stop at a specific version.
    Version(MigrationVersion),
}

impl TargetVersion {
    /// Get the concrete version, if one was configured.
    pub fn version(&self) -> Option<&MigrationVersion> {
        match self {
            Self::Version(v) => Some(v),
            _ => None,
        }
    }
}

impl FromStr for TargetVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest" => Ok(Self::Latest),
            "current" => Ok(Self::Current),
            "next" => Ok(Self::Next),
            _ => MigrationVersion::parse(s).map(Self::Version),
        }
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Current => f.write_str("current"),
            Self::Next => f.write_str("next"),
            Self::Version(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for TargetVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TargetVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
