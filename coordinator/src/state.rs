//! Coordinator state definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorState {
    /// Participants have begun; nothing committed or rolled back yet.
    Active,
    /// Every participant committed.
    Committed,
    /// Rollback was attempted on every participant.
    RolledBack,
}

impl CoordinatorState {
    /// Check if commit or rollback has already completed.
    pub fn is_finalized(&self) -> bool {
        !matches!(self, CoordinatorState::Active)
    }

    /// Get the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatorState::Active => "active",
            CoordinatorState::Committed => "committed",
            CoordinatorState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
