//! Simulation controller.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use unitwork_common::UnitOfWorkError;
use unitwork_coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorMetrics, DiagnosticSink,
    SharedMetrics, TracingSink,
};
use unitwork_ledger::{AccountId, LedgerEngine};
use unitwork_participant::{Outbox, OutboxConfig, UnitOfWork};

use crate::fault::FaultyUnit;
use crate::metrics::{RunOutcome, SimulationMetrics};
use crate::scenario::{RunPlan, Scenario};

/// Event published through the outbox when a transfer commits.
#[derive(Debug, Clone, Serialize)]
pub struct TransferEvent {
    pub run: u64,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

/// Error returned by the simulated caller action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("transfer rejected: {0}")]
    Rejected(#[from] UnitOfWorkError),
    #[error("injected action failure on run {0}")]
    Injected(u64),
}

/// Controls the simulation.
pub struct SimulationController {
    scenario: Scenario,
    fault_rate: f64,
    /// Random number generator.
    rng: StdRng,
    ledger: Arc<LedgerEngine>,
    accounts: Vec<AccountId>,
    /// Sum of opening balances; committed balances must always add up to it.
    total_funds: Decimal,
    sink: Arc<dyn DiagnosticSink>,
    /// Base configuration; each run gets its own name.
    coordinator_config: CoordinatorConfig,
    outbox_config: OutboxConfig,
    coordinator_metrics: SharedMetrics,
    /// Simulation metrics.
    metrics: SimulationMetrics,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(scenario: Scenario, fault_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            scenario,
            fault_rate,
            rng,
            ledger: Arc::new(LedgerEngine::default()),
            accounts: Vec::new(),
            total_funds: Decimal::ZERO,
            sink: Arc::new(TracingSink),
            coordinator_config: CoordinatorConfig::default(),
            outbox_config: OutboxConfig::default(),
            coordinator_metrics: Arc::new(CoordinatorMetrics::new()),
            metrics: SimulationMetrics::new(),
        }
    }

    /// Use a different diagnostic sink.
    #[allow(dead_code)]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use loaded coordinator and outbox configuration.
    pub fn with_config(
        mut self,
        coordinator_config: CoordinatorConfig,
        outbox_config: OutboxConfig,
    ) -> Self {
        self.coordinator_config = coordinator_config;
        self.outbox_config = outbox_config;
        self
    }

    /// Open the simulated accounts.
    pub fn initialize(&mut self, account_count: usize) -> anyhow::Result<()> {
        anyhow::ensure!(account_count >= 2, "at least two accounts are required");
        info!("Initializing simulation with {} accounts", account_count);

        let opening_balance = Decimal::from(10_000);
        for i in 0..account_count {
            let id = self
                .ledger
                .open_account(format!("ACC_{}", i + 1), "USD", opening_balance)?;
            self.accounts.push(id);
            self.total_funds += opening_balance;
        }

        Ok(())
    }

    /// Run the scenario `runs` times.
    pub async fn run(&mut self, runs: u64) -> anyhow::Result<()> {
        info!(
            "Running scenario: {} - {}",
            self.scenario.name(),
            self.scenario.description()
        );

        for run in 0..runs {
            let plan = self.scenario.plan(&mut self.rng, self.fault_rate);
            self.run_once(run, plan).await?;
        }

        self.verify_ledger()
    }

    /// Execute one coordinated transfer according to `plan`.
    async fn run_once(&mut self, run: u64, plan: RunPlan) -> anyhow::Result<()> {
        let (from, to, amount) = self.pick_transfer();
        let started = Instant::now();

        let ledger_unit = Arc::new(self.ledger.unit("ledger"));
        let audit = Arc::new(FaultyUnit::new("audit", plan.fault));
        let (outbox, mut events) = Outbox::new("events", self.outbox_config.clone());
        let outbox = Arc::new(outbox);

        let participants: Vec<Arc<dyn UnitOfWork>> =
            vec![ledger_unit.clone(), audit.clone(), outbox.clone()];
        let run_name = match &self.coordinator_config.name {
            Some(name) => format!("{}-run-{}", name, run),
            None => format!("run-{}", run),
        };
        let config = self.coordinator_config.clone().with_name(run_name);
        let journal_before = self.ledger.journal_len();

        let mut coordinator = match Coordinator::with_config(
            participants,
            self.sink.clone(),
            config,
            self.coordinator_metrics.clone(),
        )
        .await
        {
            Ok(coordinator) => coordinator,
            Err(err) => {
                debug!(run, error = %err, "Coordinator could not begin");
                self.finish(RunOutcome::BeginFailed, started, &err);
                return Ok(());
            }
        };

        let (unit, publisher, from, to) = (&ledger_unit, &outbox, &from, &to);
        let result = coordinator
            .run_async(move || async move {
                unit.transfer(from, to, amount)?;
                publisher.publish(TransferEvent {
                    run,
                    from: from.to_string(),
                    to: to.to_string(),
                    amount,
                })?;

                if plan.action_fails {
                    return Err(ActionError::Injected(run));
                }
                Ok(())
            })
            .await;

        let outcome = match &result {
            Ok(()) => RunOutcome::Committed,
            Err(CoordinatorError::Action { .. }) => RunOutcome::ActionFailed,
            Err(_) => RunOutcome::CommitFailed,
        };

        if outcome == RunOutcome::CommitFailed && self.ledger.journal_len() > journal_before {
            warn!(run, "Ledger committed before a later participant failed");
            self.metrics.record_partial_commit();
        }

        match &result {
            Ok(()) => self.metrics.record(outcome, elapsed_us(started)),
            Err(err) => self.finish(outcome, started, err),
        }

        let mut delivered = 0;
        while events.try_recv().is_ok() {
            delivered += 1;
        }
        self.metrics.record_events(delivered);
        debug!(run, ?outcome, audit_calls = audit.calls(), delivered, "Run finished");

        coordinator.close().await?;
        Ok(())
    }

    fn finish<E>(&mut self, outcome: RunOutcome, started: Instant, err: &CoordinatorError<E>) {
        if !err.rollback_failures().is_empty() {
            self.metrics.record_rollback_failures();
        }
        self.metrics.record(outcome, elapsed_us(started));
    }

    fn pick_transfer(&mut self) -> (AccountId, AccountId, Decimal) {
        let from = self.rng.gen_range(0..self.accounts.len());
        let mut to = self.rng.gen_range(0..self.accounts.len());
        while to == from {
            to = self.rng.gen_range(0..self.accounts.len());
        }
        let amount = Decimal::from(self.rng.gen_range(1..=500));

        (self.accounts[from].clone(), self.accounts[to].clone(), amount)
    }

    /// Check that committed batches balance and no money was created.
    fn verify_ledger(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.ledger.verify_integrity(), "ledger journal is unbalanced");

        let mut total = Decimal::ZERO;
        for id in &self.accounts {
            total += self.ledger.balance(id)?;
        }
        anyhow::ensure!(
            total == self.total_funds,
            "ledger holds {} but {} was deposited",
            total,
            self.total_funds
        );

        Ok(())
    }

    /// Get simulation metrics.
    pub fn metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }

    /// Get coordinator metrics.
    pub fn coordinator_metrics(&self) -> &SharedMetrics {
        &self.coordinator_metrics
    }

    /// The simulated ledger.
    pub fn ledger(&self) -> &Arc<LedgerEngine> {
        &self.ledger
    }
}

fn elapsed_us(started: Instant) -> u64 {
    started.elapsed().as_micros() as u64
}
