//! Diagnostic records emitted for every participant operation.
//!
//! The coordinator does not log participant phases through global state: it
//! hands a [`Diagnostic`] to the [`DiagnosticSink`] passed to its constructor.
//! [`TracingSink`] forwards records to `tracing`; [`MemorySink`] keeps them for
//! inspection.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};

use unitwork_common::{Phase, ScopeId, UnitOfWorkError};

/// Outcome of one participant operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// One structured record, keyed by participant name and phase.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Coordinator instance that produced the record.
    pub scope_id: ScopeId,
    /// Participant name.
    pub participant: String,
    /// Phase the operation belongs to.
    pub phase: Phase,
    /// Outcome.
    pub outcome: Outcome,
    /// Error text for failed operations.
    pub error: Option<String>,
    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,
}

impl Diagnostic {
    /// Record of a successful operation.
    pub fn succeeded(scope_id: ScopeId, participant: impl Into<String>, phase: Phase) -> Self {
        Self {
            scope_id,
            participant: participant.into(),
            phase,
            outcome: Outcome::Succeeded,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    /// Record of a failed operation.
    pub fn failed(
        scope_id: ScopeId,
        participant: impl Into<String>,
        phase: Phase,
        err: &UnitOfWorkError,
    ) -> Self {
        Self {
            scope_id,
            participant: participant.into(),
            phase,
            outcome: Outcome::Failed,
            error: Some(err.to_string()),
            recorded_at: Utc::now(),
        }
    }
}

/// Receiver of diagnostic records.
///
/// Not required for correctness; implementations must not panic.
pub trait DiagnosticSink: Send + Sync {
    /// Accept one record.
    fn record(&self, diagnostic: Diagnostic);
}

/// Sink that emits each record as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: Diagnostic) {
        match diagnostic.outcome {
            Outcome::Succeeded => info!(
                scope_id = %diagnostic.scope_id,
                participant = %diagnostic.participant,
                phase = %diagnostic.phase,
                "Participant {} succeeded",
                diagnostic.phase
            ),
            Outcome::Failed => error!(
                scope_id = %diagnostic.scope_id,
                participant = %diagnostic.participant,
                phase = %diagnostic.phase,
                error = diagnostic.error.as_deref().unwrap_or_default(),
                "Participant {} failed",
                diagnostic.phase
            ),
        }
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all records, in the order they were produced.
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.lock().clone()
    }

    /// Number of records matching a phase and outcome.
    pub fn count(&self, phase: Phase, outcome: Outcome) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|d| d.phase == phase && d.outcome == outcome)
            .count()
    }

    /// `participant:phase` pairs in order, handy for asserting sequencing.
    pub fn sequence(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|d| format!("{}:{}", d.participant, d.phase))
            .collect()
    }

    /// Drop all records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, diagnostic: Diagnostic) {
        self.records.lock().push(diagnostic);
    }
}
