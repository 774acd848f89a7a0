//! Migration states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category tags carried by a [`MigrationState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateCategory {
    /// A matching migration exists in the configured sources.
    Resolved,
    /// A row exists in the schema history.
    Applied,
    /// The migration failed.
    Failed,
    /// Applied with a version newer than anything resolved.
    Future,
    /// Applied, older than the latest resolved version, but no longer resolved.
    Missing,
}

use StateCategory::{Applied, Failed, Future, Missing, Resolved};

/// The terminal classification of a migration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    /// Resolved but not yet applied.
    Pending,
    /// Resolved but above the configured target.
    AboveTarget,
    /// Resolved but at or below the baseline.
    BelowBaseline,
    /// The baseline marker.
    Baseline,
    /// Resolved but skipped (out of order or not cherry-picked).
    Ignored,
    /// Applied successfully but no longer resolved.
    MissingSuccess,
    /// Applied unsuccessfully and no longer resolved.
    MissingFailed,
    /// Applied successfully.
    Success,
    /// Applied unsuccessfully.
    Failed,
    /// Applied successfully after a higher version.
    OutOfOrder,
    /// Applied successfully with a version newer than any resolved one.
    FutureSuccess,
    /// Applied unsuccessfully with a version newer than any resolved one.
    FutureFailed,
    /// Repeatable whose resolved content changed since it was applied.
    Outdated,
    /// Repeatable run replaced by a later run.
    Superseded,
    /// Logically removed from history.
    Deleted,
}

impl MigrationState {
    /// Category tags of this state.
    pub fn categories(&self) -> &'static [StateCategory] {
        match self {
            Self::Pending | Self::AboveTarget | Self::BelowBaseline | Self::Ignored => &[Resolved],
            Self::Baseline
            | Self::Success
            | Self::OutOfOrder
            | Self::Outdated
            | Self::Superseded => &[Resolved, Applied],
            Self::MissingSuccess => &[Applied, Missing],
            Self::MissingFailed => &[Applied, Failed, Missing],
            Self::Failed => &[Resolved, Applied, Failed],
            Self::FutureSuccess => &[Applied, Future],
            Self::FutureFailed => &[Applied, Failed, Future],
            Self::Deleted => &[Applied],
        }
    }

    /// Check if this state carries a category.
    pub fn is(&self, category: StateCategory) -> bool {
        self.categories().contains(&category)
    }

    /// Check if the migration is resolved.
    pub fn is_resolved(&self) -> bool {
        self.is(Resolved)
    }

    /// Check if the migration has a history row.
    pub fn is_applied(&self) -> bool {
        self.is(Applied)
    }

    /// Check if the migration failed.
    pub fn is_failed(&self) -> bool {
        self.is(Failed)
    }

    /// Name shown to users.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::AboveTarget => "Above Target",
            Self::BelowBaseline => "Below Baseline",
            Self::Baseline => "Baseline",
            Self::Ignored => "Ignored",
            Self::MissingSuccess => "Missing",
            Self::MissingFailed => "Failed (Missing)",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::OutOfOrder => "Out of Order",
            Self::FutureSuccess => "Future",
            Self::FutureFailed => "Failed (Future)",
            Self::Outdated => "Outdated",
            Self::Superseded => "Superseded",
            Self::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_membership() {
        assert!(MigrationState::Pending.is_resolved());
        assert!(!MigrationState::Pending.is_applied());

        assert!(MigrationState::OutOfOrder.is(Resolved));
        assert!(MigrationState::OutOfOrder.is(Applied));

        let missing_failed = MigrationState::MissingFailed;
        assert!(missing_failed.is(Applied));
        assert!(missing_failed.is(Failed));
        assert!(missing_failed.is(Missing));
        assert!(!missing_failed.is(Resolved));

        assert_eq!(MigrationState::Deleted.categories(), &[Applied]);
        assert!(MigrationState::FutureFailed.is_failed());
        assert!(!MigrationState::FutureSuccess.is_failed());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(MigrationState::AboveTarget.to_string(), "Above Target");
        assert_eq!(MigrationState::MissingFailed.to_string(), "Failed (Missing)");
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_string(&MigrationState::OutOfOrder).unwrap();
        assert_eq!(json, "\"OUT_OF_ORDER\"");
    }
}
