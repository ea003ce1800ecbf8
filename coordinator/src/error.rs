//! Coordinator error types.

use std::convert::Infallible;

use thiserror::Error;

use unitwork_common::{Phase, UnitOfWorkError};

use crate::state::CoordinatorState;

/// A single participant failing one phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{participant} failed to {phase}: {source}")]
pub struct PhaseFailure {
    /// Name of the participant.
    pub participant: String,
    /// Phase that failed.
    pub phase: Phase,
    /// Error reported by the participant.
    #[source]
    pub source: UnitOfWorkError,
}

impl PhaseFailure {
    /// Create a new phase failure.
    pub fn new(participant: impl Into<String>, phase: Phase, source: UnitOfWorkError) -> Self {
        Self {
            participant: participant.into(),
            phase,
            source,
        }
    }
}

/// Errors returned by a coordinator.
///
/// `E` is the error type of the caller's action. Operations that never run an
/// action use the default, [`Infallible`].
///
/// On the action and commit paths the triggering error is always preserved;
/// failures hit while rolling back afterwards are attached alongside it rather
/// than replacing it.
#[derive(Error, Debug)]
pub enum CoordinatorError<E = Infallible> {
    /// A participant could not start its transaction.
    #[error("participant {participant} failed to begin: {source}")]
    Begin {
        participant: String,
        #[source]
        source: UnitOfWorkError,
        /// Failures rolling back the participants that had already begun.
        rollback_failures: Vec<PhaseFailure>,
    },

    /// The caller's action failed.
    #[error("action failed: {source}")]
    Action {
        #[source]
        source: E,
        rollback_failures: Vec<PhaseFailure>,
    },

    /// A participant failed to commit.
    #[error("participant {participant} failed to commit: {source}")]
    Commit {
        participant: String,
        #[source]
        source: UnitOfWorkError,
        rollback_failures: Vec<PhaseFailure>,
    },

    /// One or more participants failed to roll back.
    #[error("rollback failed for {} participant(s)", .failures.len())]
    Rollback { failures: Vec<PhaseFailure> },

    /// The coordinator already committed or rolled back.
    #[error("coordinator already finalized ({state})")]
    Finalized { state: CoordinatorState },
}

impl<E> CoordinatorError<E> {
    /// Phase the error originated in, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            CoordinatorError::Begin { .. } => Some(Phase::Begin),
            CoordinatorError::Action { .. } => Some(Phase::Action),
            CoordinatorError::Commit { .. } => Some(Phase::Commit),
            CoordinatorError::Rollback { .. } => Some(Phase::Rollback),
            CoordinatorError::Finalized { .. } => None,
        }
    }

    /// Participant that caused the error, for begin and commit failures.
    pub fn participant(&self) -> Option<&str> {
        match self {
            CoordinatorError::Begin { participant, .. }
            | CoordinatorError::Commit { participant, .. } => Some(participant),
            _ => None,
        }
    }

    /// Rollback failures recorded while cleaning up, or the failures
    /// themselves for a rollback error.
    pub fn rollback_failures(&self) -> &[PhaseFailure] {
        match self {
            CoordinatorError::Begin {
                rollback_failures, ..
            }
            | CoordinatorError::Action {
                rollback_failures, ..
            }
            | CoordinatorError::Commit {
                rollback_failures, ..
            } => rollback_failures,
            CoordinatorError::Rollback { failures } => failures,
            CoordinatorError::Finalized { .. } => &[],
        }
    }

    /// The caller's error, if the action failed.
    pub fn action_error(&self) -> Option<&E> {
        match self {
            CoordinatorError::Action { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Take the caller's error out, or get `self` back for any other failure.
    pub fn into_action_error(self) -> std::result::Result<E, Self> {
        match self {
            CoordinatorError::Action { source, .. } => Ok(source),
            other => Err(other),
        }
    }

    /// The participant error for begin and commit failures.
    pub fn unit_error(&self) -> Option<&UnitOfWorkError> {
        match self {
            CoordinatorError::Begin { source, .. } | CoordinatorError::Commit { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Attach rollback failures collected after this error was raised.
    pub(crate) fn with_rollback_failures(mut self, failures: Vec<PhaseFailure>) -> Self {
        match &mut self {
            CoordinatorError::Begin {
                rollback_failures, ..
            }
            | CoordinatorError::Action {
                rollback_failures, ..
            }
            | CoordinatorError::Commit {
                rollback_failures, ..
            } => rollback_failures.extend(failures),
            CoordinatorError::Rollback { failures: existing } => existing.extend(failures),
            CoordinatorError::Finalized { .. } => {}
        }
        self
    }
}

impl CoordinatorError<Infallible> {
    /// Convert an error raised without a caller action into one carrying the
    /// caller's action error type.
    pub fn widen<E>(self) -> CoordinatorError<E> {
        match self {
            CoordinatorError::Begin {
                participant,
                source,
                rollback_failures,
            } => CoordinatorError::Begin {
                participant,
                source,
                rollback_failures,
            },
            CoordinatorError::Action { source, .. } => match source {},
            CoordinatorError::Commit {
                participant,
                source,
                rollback_failures,
            } => CoordinatorError::Commit {
                participant,
                source,
                rollback_failures,
            },
            CoordinatorError::Rollback { failures } => CoordinatorError::Rollback { failures },
            CoordinatorError::Finalized { state } => CoordinatorError::Finalized { state },
        }
    }
}

/// Result type for coordinator operations.
pub type Result<T, E = Infallible> = std::result::Result<T, CoordinatorError<E>>;
