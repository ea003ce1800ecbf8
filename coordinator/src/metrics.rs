//! Metrics collection for coordinator monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Coordinator metrics, shared by every coordinator built with the same handle.
pub struct CoordinatorMetrics {
    /// Coordinators successfully constructed.
    pub scopes_opened: AtomicU64,
    /// Runs started.
    pub runs_started: AtomicU64,
    /// Runs or direct commits that committed every participant.
    pub commits: AtomicU64,
    /// Rollback passes over all participants.
    pub rollbacks: AtomicU64,
    /// Actions that returned an error.
    pub action_failures: AtomicU64,
    /// Participant begin failures.
    pub begin_failures: AtomicU64,
    /// Participant commit failures.
    pub commit_failures: AtomicU64,
    /// Participant rollback failures.
    pub rollback_failures: AtomicU64,
    /// Rollbacks triggered by disposal rather than a failing run.
    pub disposal_rollbacks: AtomicU64,
    /// Participants begun.
    pub participants_begun: AtomicU64,
}

impl CoordinatorMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            scopes_opened: AtomicU64::new(0),
            runs_started: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            action_failures: AtomicU64::new(0),
            begin_failures: AtomicU64::new(0),
            commit_failures: AtomicU64::new(0),
            rollback_failures: AtomicU64::new(0),
            disposal_rollbacks: AtomicU64::new(0),
            participants_begun: AtomicU64::new(0),
        }
    }

    pub fn scope_opened(&self) {
        self.scopes_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn committed(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rolled_back(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_failed(&self) {
        self.action_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn begin_failed(&self) {
        self.begin_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn commit_failed(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rollback_failed(&self) {
        self.rollback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disposal_rollback(&self) {
        self.disposal_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn participant_begun(&self) {
        self.participants_begun.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scopes_opened: self.scopes_opened.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
            begin_failures: self.begin_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            rollback_failures: self.rollback_failures.load(Ordering::Relaxed),
            disposal_rollbacks: self.disposal_rollbacks.load(Ordering::Relaxed),
            participants_begun: self.participants_begun.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("scopes_opened", "Coordinators constructed", snapshot.scopes_opened),
            ("runs_started", "Coordinated runs started", snapshot.runs_started),
            ("commits", "Commits across all participants", snapshot.commits),
            ("rollbacks", "Rollback passes across all participants", snapshot.rollbacks),
            ("action_failures", "Caller actions that failed", snapshot.action_failures),
            ("begin_failures", "Participant begin failures", snapshot.begin_failures),
            ("commit_failures", "Participant commit failures", snapshot.commit_failures),
            ("rollback_failures", "Participant rollback failures", snapshot.rollback_failures),
            ("disposal_rollbacks", "Rollbacks triggered by disposal", snapshot.disposal_rollbacks),
            ("participants_begun", "Participants begun", snapshot.participants_begun),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP unitwork_{name} {help}\n# TYPE unitwork_{name} counter\nunitwork_{name} {value}\n\n"
            ));
        }
        output
    }
}

impl Default for CoordinatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub scopes_opened: u64,
    pub runs_started: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub action_failures: u64,
    pub begin_failures: u64,
    pub commit_failures: u64,
    pub rollback_failures: u64,
    pub disposal_rollbacks: u64,
    pub participants_begun: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<CoordinatorMetrics>;
