//! Simulation metrics.

use std::collections::VecDeque;

use serde::Serialize;

/// How a simulated run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Committed,
    BeginFailed,
    ActionFailed,
    CommitFailed,
}

/// Simulation metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Total runs attempted.
    pub total_runs: u64,
    /// Runs where every participant committed.
    pub committed: u64,
    /// Runs where construction failed.
    pub begin_failures: u64,
    /// Runs where the action failed.
    pub action_failures: u64,
    /// Runs where a participant failed to commit.
    pub commit_failures: u64,
    /// Commit failures that left the ledger committed.
    pub partial_commits: u64,
    /// Runs whose error carried rollback failures.
    pub runs_with_rollback_failures: u64,
    /// Events delivered by the outbox.
    pub events_delivered: u64,
    /// Latency samples (microseconds).
    #[serde(skip)]
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    #[serde(skip)]
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_runs: 0,
            committed: 0,
            begin_failures: 0,
            action_failures: 0,
            commit_failures: 0,
            partial_commits: 0,
            runs_with_rollback_failures: 0,
            events_delivered: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record the outcome of one run.
    pub fn record(&mut self, outcome: RunOutcome, latency_us: u64) {
        self.total_runs += 1;

        match outcome {
            RunOutcome::Committed => self.committed += 1,
            RunOutcome::BeginFailed => self.begin_failures += 1,
            RunOutcome::ActionFailed => self.action_failures += 1,
            RunOutcome::CommitFailed => self.commit_failures += 1,
        }

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Record a commit failure that happened after the ledger applied its batch.
    pub fn record_partial_commit(&mut self) {
        self.partial_commits += 1;
    }

    /// Record a run whose cleanup hit rollback failures.
    pub fn record_rollback_failures(&mut self) {
        self.runs_with_rollback_failures += 1;
    }

    /// Record delivered outbox events.
    pub fn record_events(&mut self, count: u64) {
        self.events_delivered += count;
    }

    /// Get average latency in microseconds.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p50 latency.
    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get commit rate.
    pub fn commit_rate(&self) -> f64 {
        if self.total_runs == 0 {
            return 0.0;
        }

        self.committed as f64 / self.total_runs as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
