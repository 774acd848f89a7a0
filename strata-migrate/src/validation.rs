//! Validation policy and migration patterns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ErrorDetails, MigrationError};
use crate::version::MigrationVersion;

/// Which migrations a [`ValidatePattern`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Any,
    Repeatable,
    Versioned,
}

/// Which state a [`ValidatePattern`] ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternState {
    Any,
    Missing,
    Pending,
    Ignored,
    Future,
    Failed,
}

/// A `kind:state` pattern that suppresses validation errors, such as
/// `*:future` or `versioned:missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatePattern {
    pub kind: PatternKind,
    pub state: PatternState,
}

impl ValidatePattern {
    /// Check if the pattern covers a state for a migration kind.
    pub fn matches(&self, state: PatternState, repeatable: bool) -> bool {
        let kind = match self.kind {
            PatternKind::Any => true,
            PatternKind::Repeatable => repeatable,
            PatternKind::Versioned => !repeatable,
        };
        kind && (self.state == PatternState::Any || self.state == state)
    }
}

impl FromStr for ValidatePattern {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            MigrationError::configuration(format!(
                "Invalid validate pattern '{}'. Expected <*|repeatable|versioned>:<*|missing|pending|ignored|future|failed>",
                s
            ))
        };

        let (kind, state) = s.trim().split_once(':').ok_or_else(invalid)?;
        let kind = match kind.to_lowercase().as_str() {
            "*" => PatternKind::Any,
            "repeatable" => PatternKind::Repeatable,
            "versioned" => PatternKind::Versioned,
            _ => return Err(invalid()),
        };
        let state = match state.to_lowercase().as_str() {
            "*" => PatternState::Any,
            "missing" => PatternState::Missing,
            "pending" => PatternState::Pending,
            "ignored" => PatternState::Ignored,
            "future" => PatternState::Future,
            "failed" => PatternState::Failed,
            _ => return Err(invalid()),
        };
        Ok(Self { kind, state })
    }
}

impl fmt::Display for ValidatePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PatternKind::Any => "*",
            PatternKind::Repeatable => "repeatable",
            PatternKind::Versioned => "versioned",
        };
        let state = match self.state {
            PatternState::Any => "*",
            PatternState::Missing => "missing",
            PatternState::Pending => "pending",
            PatternState::Ignored => "ignored",
            PatternState::Future => "future",
            PatternState::Failed => "failed",
        };
        write!(f, "{}:{}", kind, state)
    }
}

impl Serialize for ValidatePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ValidatePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Policy applied when validating migration states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationContext {
    /// Patterns whose matching states are not reported.
    pub ignore_patterns: Vec<ValidatePattern>,
    /// Whether pending and outdated migrations are acceptable.
    pub allow_pending: bool,
}

impl ValidationContext {
    /// Create a context from ignore patterns.
    pub fn new(ignore_patterns: Vec<ValidatePattern>) -> Self {
        Self {
            ignore_patterns,
            allow_pending: false,
        }
    }

    /// Allow pending migrations.
    pub fn allow_pending(mut self, allow: bool) -> Self {
        self.allow_pending = allow;
        self
    }

    /// Add an ignore pattern.
    pub fn ignore(mut self, pattern: ValidatePattern) -> Self {
        self.ignore_patterns.push(pattern);
        self
    }

    /// Check if a state is ignored for a migration kind.
    pub fn is_ignored(&self, state: PatternState, repeatable: bool) -> bool {
        self.ignore_patterns
            .iter()
            .any(|p| p.matches(state, repeatable))
    }
}

/// A cherry-pick entry: a version for versioned migrations, or a description
/// for repeatable ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPattern {
    pattern: String,
    version: Option<MigrationVersion>,
}

impl MigrationPattern {
    /// Create a pattern.
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let version = MigrationVersion::parse(&pattern).ok();
        Self { pattern, version }
    }

    /// Check if the pattern selects a migration.
    pub fn matches(&self, version: Option<&MigrationVersion>, description: &str) -> bool {
        match version {
            Some(v) => self.version.as_ref() == Some(v),
            None => self.pattern.replace('_', " ").trim() == description.trim(),
        }
    }
}

impl fmt::Display for MigrationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl Serialize for MigrationPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

impl<'de> Deserialize<'de> for MigrationPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Check if a migration is selected by a cherry-pick list. An empty list
/// selects everything.
pub fn is_cherry_picked(
    patterns: &[MigrationPattern],
    version: Option<&MigrationVersion>,
    description: &str,
) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| p.matches(version, description))
}

/// A migration that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidMigration {
    /// Version, if versioned.
    pub version: Option<String>,
    /// Description.
    pub description: String,
    /// Script or physical location.
    pub file_path: String,
    /// What is wrong.
    pub error_details: ErrorDetails,
}
