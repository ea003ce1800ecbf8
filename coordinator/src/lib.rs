//! Unitwork Coordinator
//!
//! The coordinator ties several independent units of work into one logical
//! transaction. It begins every participant up front, runs the caller's action
//! inside an ambient [`TransactionScope`], then commits each participant in
//! registration order. Any failure rolls every participant back.
//!
//! This is a best-effort coordinator, not two-phase commit: a participant that
//! already committed is not undone when a later one fails to commit. The
//! caller always sees the original failure.

pub mod ambient;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use ambient::{Ambient, Enlistment, Resolution, TransactionScope};
pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, Outcome, TracingSink};
pub use error::{CoordinatorError, PhaseFailure, Result};
pub use metrics::{CoordinatorMetrics, MetricsSnapshot, SharedMetrics};
pub use state::CoordinatorState;
pub use unitwork_participant::{Candidate, UnitOfWork};
