//! Fault-injecting participant.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::debug;

use unitwork_common::{Phase, Result, UnitOfWorkError};
use unitwork_participant::UnitOfWork;

/// Phase in which a [`FaultyUnit`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Fault {
    None,
    Begin,
    Commit,
    Rollback,
}

impl Fault {
    fn phase(&self) -> Option<Phase> {
        match self {
            Fault::None => None,
            Fault::Begin => Some(Phase::Begin),
            Fault::Commit => Some(Phase::Commit),
            Fault::Rollback => Some(Phase::Rollback),
        }
    }
}

/// A participant that does no work and fails in one configured phase.
pub struct FaultyUnit {
    name: String,
    fault: Fault,
    calls: AtomicUsize,
}

impl FaultyUnit {
    /// Create a new unit that fails in the phase named by `fault`.
    pub fn new(name: impl Into<String>, fault: Fault) -> Self {
        Self {
            name: name.into(),
            fault,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of phase calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn enter(&self, phase: Phase) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if self.fault.phase() == Some(phase) {
            debug!(unit = %self.name, %phase, "Injecting fault");
            return Err(UnitOfWorkError::Unavailable(format!(
                "injected {} fault in {}",
                phase, self.name
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl UnitOfWork for FaultyUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> Result<()> {
        self.enter(Phase::Begin)
    }

    async fn commit(&self) -> Result<()> {
        tokio::task::yield_now().await;
        self.enter(Phase::Commit)
    }

    async fn rollback(&self) -> Result<()> {
        self.enter(Phase::Rollback)
    }
}
