//! Transaction phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The phase of a coordinated unit of work that an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Participant is starting its transaction.
    Begin,
    /// The caller's action is executing.
    Action,
    /// Participant is making its work durable.
    Commit,
    /// Participant is discarding its work.
    Rollback,
}

impl Phase {
    /// Lowercase name used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Begin => "begin",
            Phase::Action => "action",
            Phase::Commit => "commit",
            Phase::Rollback => "rollback",
        }
    }

    /// Whether this phase is executed against participants.
    pub fn is_participant_phase(&self) -> bool {
        !matches!(self, Phase::Action)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
