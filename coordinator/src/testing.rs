//! Participants for tests that record every call into a shared journal.

use std::sync::Arc;

use parking_lot::Mutex;

use unitwork_common::{Result, UnitOfWorkError};
use unitwork_participant::UnitOfWork;

pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}

pub(crate) fn count(journal: &Journal, prefix: &str) -> usize {
    journal.lock().iter().filter(|e| e.starts_with(prefix)).count()
}

/// Appends `phase:name` to the journal on every call, then fails if told to.
pub(crate) struct RecordingUnit {
    name: String,
    journal: Journal,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

impl RecordingUnit {
    pub(crate) fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            fail_begin: false,
            fail_commit: false,
            fail_rollback: false,
        }
    }

    pub(crate) fn failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    pub(crate) fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub(crate) fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub(crate) fn shared(self) -> Arc<dyn UnitOfWork> {
        Arc::new(self)
    }

    fn record(&self, phase: &str, fail: bool) -> Result<()> {
        self.journal.lock().push(format!("{}:{}", phase, self.name));
        if fail {
            return Err(UnitOfWorkError::Storage(format!("{} {} failed", self.name, phase)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl UnitOfWork for RecordingUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> Result<()> {
        self.record("begin", self.fail_begin)
    }

    async fn commit(&self) -> Result<()> {
        tokio::task::yield_now().await;
        self.record("commit", self.fail_commit)
    }

    async fn rollback(&self) -> Result<()> {
        self.record("rollback", self.fail_rollback)
    }
}

/// Well-behaved recording units named `p0`, `p1`, ...
pub(crate) fn units(count: usize, journal: &Journal) -> Vec<Arc<dyn UnitOfWork>> {
    (0..count)
        .map(|i| RecordingUnit::new(&format!("p{}", i), journal).shared())
        .collect()
}
