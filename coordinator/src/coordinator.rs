//! Core coordinator implementation.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use unitwork_common::{Phase, ScopeId};
use unitwork_participant::{Candidate, UnitOfWork};

use crate::ambient::TransactionScope;
use crate::config::CoordinatorConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{CoordinatorError, PhaseFailure, Result};
use crate::metrics::{CoordinatorMetrics, SharedMetrics};
use crate::state::CoordinatorState;

/// Sequences begin, commit, and rollback across a fixed list of units of work.
///
/// A coordinator is single-use: it begins every participant when it is
/// built, and is finalized by the first successful commit or by a rollback.
///
/// ```rust,ignore
/// let mut coordinator = Coordinator::begin(vec![orders, outbox], Arc::new(TracingSink)).await?;
/// let order_id = coordinator
///     .run_async(|| async { place_order(&request).await })
///     .await?;
/// ```
///
/// Participants are committed in registration order and the first commit
/// failure stops the loop. Rollback always visits every participant, in
/// registration order, and collects failures instead of stopping.
///
/// A coordinator dropped before it was finalized rolls its participants back
/// on the current tokio runtime (see [`CoordinatorConfig::rollback_on_drop`]).
/// On a multi-thread runtime the rollback finishes before `drop` returns. On a
/// current-thread runtime it is spawned, and is lost with a warning if the
/// runtime shuts down first. Prefer [`Coordinator::close`] to observe that
/// rollback's outcome.
pub struct Coordinator {
    /// Correlates diagnostics and the ambient scope of this instance.
    id: ScopeId,
    config: CoordinatorConfig,
    /// Registration order is commit and rollback order.
    participants: Vec<Arc<dyn UnitOfWork>>,
    state: CoordinatorState,
    sink: Arc<dyn DiagnosticSink>,
    metrics: SharedMetrics,
}

impl Coordinator {
    /// Register `participants` and begin each of them, in order.
    pub async fn begin(
        participants: Vec<Arc<dyn UnitOfWork>>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        Self::with_config(
            participants,
            sink,
            CoordinatorConfig::default(),
            Arc::new(CoordinatorMetrics::new()),
        )
        .await
    }

    /// Register the candidates that are units of work, skipping the rest.
    pub async fn from_candidates<I>(candidates: I, sink: Arc<dyn DiagnosticSink>) -> Result<Self>
    where
        I: IntoIterator<Item = Candidate>,
    {
        let participants = candidates
            .into_iter()
            .filter_map(Candidate::into_participant)
            .collect();

        Self::begin(participants, sink).await
    }

    /// Register and begin participants with explicit configuration and metrics.
    ///
    /// If a participant fails to begin, the participants begun before it are
    /// rolled back and the begin failure is returned. Later participants are
    /// never begun.
    #[instrument(skip_all, fields(participants = participants.len(), name = config.label()))]
    pub async fn with_config(
        participants: Vec<Arc<dyn UnitOfWork>>,
        sink: Arc<dyn DiagnosticSink>,
        config: CoordinatorConfig,
        metrics: SharedMetrics,
    ) -> Result<Self> {
        let id = ScopeId::new();

        for (position, participant) in participants.iter().enumerate() {
            match participant.begin().await {
                Ok(()) => {
                    metrics.participant_begun();
                    sink.record(Diagnostic::succeeded(id, participant.name(), Phase::Begin));
                }
                Err(source) => {
                    metrics.begin_failed();
                    sink.record(Diagnostic::failed(
                        id,
                        participant.name(),
                        Phase::Begin,
                        &source,
                    ));
                    warn!(
                        scope_id = %id,
                        participant = participant.name(),
                        position,
                        error = %source,
                        "Begin failed, rolling back participants already begun"
                    );

                    let rollback_failures =
                        rollback_all(id, &participants[..position], sink.as_ref(), &metrics).await;

                    return Err(CoordinatorError::Begin {
                        participant: participant.name().to_string(),
                        source,
                        rollback_failures,
                    });
                }
            }
        }

        metrics.scope_opened();
        debug!(scope_id = %id, participants = participants.len(), "Coordinator opened");

        Ok(Self {
            id,
            config,
            participants,
            state: CoordinatorState::Active,
            sink,
            metrics,
        })
    }

    /// Run a synchronous action, then commit every participant.
    ///
    /// If the action or any commit fails, every participant is rolled back
    /// and the original failure is returned.
    pub async fn run<F, E>(&mut self, action: F) -> Result<(), E>
    where
        F: FnOnce() -> std::result::Result<(), E>,
    {
        self.run_async(move || std::future::ready(action())).await
    }

    /// Run an asynchronous function, then commit every participant.
    ///
    /// The function's value is returned only once every participant has
    /// committed and the ambient scope has completed. Use `T = ()` when
    /// there is nothing to return.
    #[instrument(skip_all, fields(scope_id = %self.id, name = self.config.label()))]
    pub async fn run_async<F, Fut, T, E>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Err(err) = self.ensure_active() {
            return Err(err.widen());
        }
        self.metrics.run_started();

        let mut scope = TransactionScope::with_id(self.id);

        let value = match scope.enter(async move { f().await }).await {
            Ok(value) => value,
            Err(source) => {
                self.metrics.action_failed();
                warn!(scope_id = %self.id, "Action failed, rolling back all participants");

                let rollback_failures = self.rollback_participants().await;
                return Err(CoordinatorError::Action {
                    source,
                    rollback_failures,
                });
            }
        };

        if let Err(err) = scope.enter(self.commit_participants()).await {
            warn!(scope_id = %self.id, error = %err, "Commit failed, rolling back all participants");

            let rollback_failures = self.rollback_participants().await;
            return Err(err.with_rollback_failures(rollback_failures).widen());
        }

        scope.complete();
        drop(scope);

        self.state = CoordinatorState::Committed;
        self.metrics.committed();
        info!(
            scope_id = %self.id,
            participants = self.participants.len(),
            "Coordinated run committed"
        );

        Ok(value)
    }

    /// Commit every participant in registration order.
    ///
    /// Stops at the first failure; the participants after it are not
    /// committed and the coordinator stays active, so a later
    /// [`Coordinator::rollback`] or disposal still rolls everything back.
    #[instrument(skip_all, fields(scope_id = %self.id))]
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.commit_participants().await?;

        self.state = CoordinatorState::Committed;
        self.metrics.committed();
        Ok(())
    }

    /// Roll back every participant in registration order.
    ///
    /// Every participant is visited even if some fail; the failures are
    /// returned together. No-op on a finalized coordinator.
    #[instrument(skip_all, fields(scope_id = %self.id))]
    pub async fn rollback(&mut self) -> Result<()> {
        if self.state.is_finalized() {
            debug!(scope_id = %self.id, state = %self.state, "Rollback skipped, already finalized");
            return Ok(());
        }

        let failures = self.rollback_participants().await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoordinatorError::Rollback { failures })
        }
    }

    /// Release the coordinator, rolling back if it was never finalized.
    pub async fn close(mut self) -> Result<()> {
        if self.state.is_finalized() {
            return Ok(());
        }

        self.metrics.disposal_rollback();
        self.rollback().await
    }

    /// Scope identifier of this coordinator.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Check if commit or rollback already completed.
    pub fn is_finalized(&self) -> bool {
        self.state.is_finalized()
    }

    /// Number of registered participants.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Participant names in registration order.
    pub fn participant_names(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.name()).collect()
    }

    /// Metrics handle.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // --- Private methods ---

    fn ensure_active(&self) -> Result<()> {
        if self.state.is_finalized() {
            return Err(CoordinatorError::Finalized { state: self.state });
        }
        Ok(())
    }

    async fn commit_participants(&self) -> Result<()> {
        for participant in &self.participants {
            if let Err(source) = participant.commit().await {
                self.metrics.commit_failed();
                self.sink.record(Diagnostic::failed(
                    self.id,
                    participant.name(),
                    Phase::Commit,
                    &source,
                ));

                return Err(CoordinatorError::Commit {
                    participant: participant.name().to_string(),
                    source,
                    rollback_failures: Vec::new(),
                });
            }

            self.sink
                .record(Diagnostic::succeeded(self.id, participant.name(), Phase::Commit));
        }

        Ok(())
    }

    async fn rollback_participants(&mut self) -> Vec<PhaseFailure> {
        let failures = rollback_all(
            self.id,
            &self.participants,
            self.sink.as_ref(),
            &self.metrics,
        )
        .await;

        self.state = CoordinatorState::RolledBack;
        failures
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if self.state.is_finalized() {
            return;
        }

        if self.config.warn_on_unfinalized_drop {
            warn!(
                scope_id = %self.id,
                name = self.config.label(),
                "Coordinator dropped before commit or rollback"
            );
        }

        if !self.config.rollback_on_drop {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    scope_id = %self.id,
                    "No async runtime available, participants were not rolled back"
                );
                return;
            }
        };

        self.state = CoordinatorState::RolledBack;
        let rollback = DisposalRollback {
            id: self.id,
            participants: std::mem::take(&mut self.participants),
            sink: Arc::clone(&self.sink),
            metrics: Arc::clone(&self.metrics),
            done: false,
        };

        // A current-thread runtime cannot block here; the rollback runs once
        // the runtime polls again and is reported lost if it never does.
        match handle.runtime_flavor() {
            tokio::runtime::RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(rollback.run()));
            }
            _ => {
                handle.spawn(rollback.run());
            }
        }
    }
}

/// Rollback owed by a coordinator that was dropped before it was finalized.
struct DisposalRollback {
    id: ScopeId,
    participants: Vec<Arc<dyn UnitOfWork>>,
    sink: Arc<dyn DiagnosticSink>,
    metrics: SharedMetrics,
    done: bool,
}

impl DisposalRollback {
    async fn run(mut self) {
        let failures =
            rollback_all(self.id, &self.participants, self.sink.as_ref(), &self.metrics).await;
        self.metrics.disposal_rollback();
        self.done = true;

        if !failures.is_empty() {
            warn!(scope_id = %self.id, failures = failures.len(), "Disposal rollback incomplete");
        }
    }
}

impl Drop for DisposalRollback {
    fn drop(&mut self) {
        if !self.done {
            warn!(
                scope_id = %self.id,
                participants = self.participants.len(),
                "Runtime shut down before disposal rollback ran, participants were not rolled back"
            );
        }
    }
}

/// Roll back `participants` in order, continuing past failures.
async fn rollback_all(
    id: ScopeId,
    participants: &[Arc<dyn UnitOfWork>],
    sink: &dyn DiagnosticSink,
    metrics: &CoordinatorMetrics,
) -> Vec<PhaseFailure> {
    let mut failures = Vec::new();

    for participant in participants {
        match participant.rollback().await {
            Ok(()) => sink.record(Diagnostic::succeeded(id, participant.name(), Phase::Rollback)),
            Err(source) => {
                metrics.rollback_failed();
                sink.record(Diagnostic::failed(
                    id,
                    participant.name(),
                    Phase::Rollback,
                    &source,
                ));
                failures.push(PhaseFailure::new(participant.name(), Phase::Rollback, source));
            }
        }
    }

    metrics.rolled_back();
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambient::{Ambient, Enlistment};
    use crate::diagnostics::{MemorySink, Outcome};
    use crate::testing::{count, entries, journal, units, RecordingUnit};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use unitwork_common::UnitOfWorkError;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("order rejected: {0}")]
    struct OrderRejected(String);

    fn sink() -> Arc<MemorySink> {
        Arc::new(MemorySink::new())
    }

    async fn yield_a_few() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_successful_run_commits_in_order() {
        let journal = journal();
        let sink = sink();

        let mut coordinator = Coordinator::begin(units(3, &journal), sink.clone())
            .await
            .unwrap();
        coordinator.run(|| Ok::<_, OrderRejected>(())).await.unwrap();

        assert_eq!(
            entries(&journal),
            vec![
                "begin:p0", "begin:p1", "begin:p2", "commit:p0", "commit:p1", "commit:p2"
            ]
        );
        assert_eq!(coordinator.state(), CoordinatorState::Committed);
        assert_eq!(sink.count(Phase::Begin, Outcome::Succeeded), 3);
        assert_eq!(sink.count(Phase::Commit, Outcome::Succeeded), 3);
        assert_eq!(sink.count(Phase::Rollback, Outcome::Succeeded), 0);
    }

    #[tokio::test]
    async fn test_empty_participant_list() {
        let mut coordinator = Coordinator::begin(Vec::new(), sink()).await.unwrap();

        let value = coordinator
            .run_async(|| async { Ok::<_, OrderRejected>(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert!(coordinator.is_finalized());
    }

    #[tokio::test]
    async fn test_action_failure_rolls_back_everyone() {
        let journal = journal();
        let mut coordinator = Coordinator::begin(units(3, &journal), sink()).await.unwrap();

        let err = coordinator
            .run(|| Err(OrderRejected("out of stock".into())))
            .await
            .unwrap_err();

        assert_eq!(
            err.action_error(),
            Some(&OrderRejected("out of stock".into()))
        );
        assert!(err.rollback_failures().is_empty());
        assert_eq!(count(&journal, "commit:"), 0);
        assert_eq!(count(&journal, "rollback:"), 3);
        assert_eq!(coordinator.state(), CoordinatorState::RolledBack);
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back_all_participants() {
        let journal = journal();
        let participants = vec![
            RecordingUnit::new("A", &journal).shared(),
            RecordingUnit::new("B", &journal).failing_commit().shared(),
            RecordingUnit::new("C", &journal).shared(),
        ];

        let mut coordinator = Coordinator::begin(participants, sink()).await.unwrap();
        let err = coordinator
            .run(|| Ok::<_, OrderRejected>(()))
            .await
            .unwrap_err();

        assert_eq!(
            entries(&journal),
            vec![
                "begin:A",
                "begin:B",
                "begin:C",
                "commit:A",
                "commit:B",
                "rollback:A",
                "rollback:B",
                "rollback:C",
            ]
        );
        assert_eq!(err.phase(), Some(Phase::Commit));
        assert_eq!(err.participant(), Some("B"));
        assert!(matches!(
            err.unit_error(),
            Some(UnitOfWorkError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_value_only_returned_after_commit() {
        let journal = journal();
        let mut ok = Coordinator::begin(units(2, &journal), sink()).await.unwrap();
        let value = ok
            .run_async(|| async { Ok::<_, OrderRejected>("order-42".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "order-42");

        let failing = vec![RecordingUnit::new("ledger", &journal).failing_commit().shared()];
        let mut failed = Coordinator::begin(failing, sink()).await.unwrap();
        let result = failed
            .run_async(|| async { Ok::<_, OrderRejected>("order-43".to_string()) })
            .await;
        assert!(matches!(result, Err(CoordinatorError::Commit { .. })));
    }

    #[tokio::test]
    async fn test_void_async_run() {
        let journal = journal();
        let mut coordinator = Coordinator::begin(units(2, &journal), sink()).await.unwrap();

        coordinator
            .run_async(|| async {
                tokio::task::yield_now().await;
                Ok::<(), OrderRejected>(())
            })
            .await
            .unwrap();

        assert_eq!(count(&journal, "commit:"), 2);
    }

    #[tokio::test]
    async fn test_action_error_survives_rollback_failure() {
        let journal = journal();
        let participants = vec![
            RecordingUnit::new("A", &journal).failing_rollback().shared(),
            RecordingUnit::new("B", &journal).shared(),
        ];

        let mut coordinator = Coordinator::begin(participants, sink()).await.unwrap();
        let err = coordinator
            .run(|| Err(OrderRejected("bad input".into())))
            .await
            .unwrap_err();

        // B is still rolled back after A's rollback fails
        assert_eq!(count(&journal, "rollback:"), 2);
        assert_eq!(err.rollback_failures().len(), 1);
        assert_eq!(err.rollback_failures()[0].participant, "A");
        assert_eq!(err.into_action_error().unwrap(), OrderRejected("bad input".into()));
    }

    #[tokio::test]
    async fn test_begin_failure_rolls_back_begun_participants() {
        let journal = journal();
        let participants = vec![
            RecordingUnit::new("A", &journal).shared(),
            RecordingUnit::new("B", &journal).failing_begin().shared(),
            RecordingUnit::new("C", &journal).shared(),
        ];

        let err = match Coordinator::begin(participants, sink()).await {
            Ok(_) => panic!("construction should fail"),
            Err(err) => err,
        };

        assert_eq!(err.phase(), Some(Phase::Begin));
        assert_eq!(err.participant(), Some("B"));
        assert_eq!(entries(&journal), vec!["begin:A", "begin:B", "rollback:A"]);
    }

    #[tokio::test]
    async fn test_rollback_visits_everyone_and_aggregates() {
        let journal = journal();
        let participants = vec![
            RecordingUnit::new("A", &journal).failing_rollback().shared(),
            RecordingUnit::new("B", &journal).shared(),
            RecordingUnit::new("C", &journal).failing_rollback().shared(),
        ];

        let mut coordinator = Coordinator::begin(participants, sink()).await.unwrap();
        let err = coordinator.rollback().await.unwrap_err();

        assert_eq!(count(&journal, "rollback:"), 3);
        let failed: Vec<_> = err
            .rollback_failures()
            .iter()
            .map(|f| f.participant.as_str())
            .collect();
        assert_eq!(failed, vec!["A", "C"]);
        assert_eq!(coordinator.state(), CoordinatorState::RolledBack);

        // Already finalized: no second pass
        coordinator.rollback().await.unwrap();
        assert_eq!(count(&journal, "rollback:"), 3);
    }

    #[tokio::test]
    async fn test_finalized_coordinator_rejects_run() {
        let journal = journal();
        let mut coordinator = Coordinator::begin(units(2, &journal), sink()).await.unwrap();
        coordinator.commit().await.unwrap();

        let err = coordinator
            .run(|| Ok::<_, OrderRejected>(()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoordinatorError::Finalized {
                state: CoordinatorState::Committed
            }
        ));
        assert_eq!(count(&journal, "commit:"), 2);
    }

    #[tokio::test]
    async fn test_close_after_commit_does_not_roll_back() {
        let journal = journal();
        let mut coordinator = Coordinator::begin(units(2, &journal), sink()).await.unwrap();
        coordinator.run(|| Ok::<_, OrderRejected>(())).await.unwrap();

        coordinator.close().await.unwrap();
        yield_a_few().await;

        assert_eq!(count(&journal, "rollback:"), 0);
    }

    #[tokio::test]
    async fn test_close_without_run_rolls_back() {
        let journal = journal();
        let coordinator = Coordinator::begin(units(2, &journal), sink()).await.unwrap();
        let metrics = coordinator.metrics().clone();

        coordinator.close().await.unwrap();

        assert_eq!(count(&journal, "rollback:"), 2);
        assert_eq!(metrics.snapshot().disposal_rollbacks, 1);
    }

    #[tokio::test]
    async fn test_failed_direct_commit_then_close_rolls_back() {
        let journal = journal();
        let participants = vec![
            RecordingUnit::new("A", &journal).shared(),
            RecordingUnit::new("B", &journal).failing_commit().shared(),
            RecordingUnit::new("C", &journal).shared(),
        ];

        let mut coordinator = Coordinator::begin(participants, sink()).await.unwrap();
        assert!(coordinator.commit().await.is_err());
        assert_eq!(coordinator.state(), CoordinatorState::Active);
        // C was never committed
        assert_eq!(count(&journal, "commit:C"), 0);

        coordinator.close().await.unwrap();
        assert_eq!(count(&journal, "rollback:"), 3);
    }

    #[tokio::test]
    async fn test_drop_rolls_back_on_runtime() {
        let journal = journal();
        {
            let _coordinator = Coordinator::begin(units(2, &journal), sink()).await.unwrap();
        }

        yield_a_few().await;
        assert_eq!(count(&journal, "rollback:"), 2);
    }

    #[tokio::test]
    async fn test_drop_after_successful_run_does_not_roll_back() {
        let journal = journal();
        let metrics = Arc::new(CoordinatorMetrics::new());
        {
            let mut coordinator = Coordinator::with_config(
                units(2, &journal),
                sink(),
                CoordinatorConfig::default(),
                metrics.clone(),
            )
            .await
            .unwrap();
            coordinator.run(|| Ok::<_, OrderRejected>(())).await.unwrap();
        }

        yield_a_few().await;
        assert_eq!(count(&journal, "commit:"), 2);
        assert_eq!(count(&journal, "rollback:"), 0);
        assert_eq!(metrics.snapshot().disposal_rollbacks, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_on_multi_thread_runtime_rolls_back_before_returning() {
        let journal = journal();
        let metrics = Arc::new(CoordinatorMetrics::new());
        {
            let _coordinator = Coordinator::with_config(
                units(2, &journal),
                sink(),
                CoordinatorConfig::default(),
                metrics.clone(),
            )
            .await
            .unwrap();
        }

        // No yielding: the rollback completed inside drop
        assert_eq!(count(&journal, "rollback:"), 2);
        assert_eq!(metrics.snapshot().disposal_rollbacks, 1);
    }

    #[test]
    fn test_drop_inside_multi_thread_block_on_rolls_back() {
        let journal = journal();
        let metrics = Arc::new(CoordinatorMetrics::new());
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let _coordinator = Coordinator::with_config(
                units(2, &journal),
                sink(),
                CoordinatorConfig::default(),
                metrics.clone(),
            )
            .await
            .unwrap();
        });
        drop(runtime);

        assert_eq!(count(&journal, "rollback:"), 2);
        assert_eq!(metrics.snapshot().disposal_rollbacks, 1);
    }

    #[test]
    fn test_drop_before_current_thread_runtime_ends_is_not_counted() {
        let journal = journal();
        let metrics = Arc::new(CoordinatorMetrics::new());

        // The spawned rollback never gets polled before this runtime goes away
        tokio_test::block_on(async {
            let _coordinator = Coordinator::with_config(
                units(2, &journal),
                sink(),
                CoordinatorConfig::default(),
                metrics.clone(),
            )
            .await
            .unwrap();
        });

        assert_eq!(count(&journal, "rollback:"), 0);
        assert_eq!(metrics.snapshot().disposal_rollbacks, 0);
        assert_eq!(metrics.snapshot().rollbacks, 0);
    }

    #[tokio::test]
    async fn test_drop_after_failed_run_does_not_roll_back_again() {
        let journal = journal();
        {
            let mut coordinator = Coordinator::begin(units(2, &journal), sink()).await.unwrap();
            let _ = coordinator.run(|| Err(OrderRejected("nope".into()))).await;
        }

        yield_a_few().await;
        assert_eq!(count(&journal, "rollback:"), 2);
    }

    #[tokio::test]
    async fn test_drop_without_rollback_when_disabled() {
        let journal = journal();
        let config = CoordinatorConfig {
            rollback_on_drop: false,
            ..CoordinatorConfig::default()
        };
        {
            let _coordinator = Coordinator::with_config(
                units(2, &journal),
                sink(),
                config,
                Arc::new(CoordinatorMetrics::new()),
            )
            .await
            .unwrap();
        }

        yield_a_few().await;
        assert_eq!(count(&journal, "rollback:"), 0);
    }

    #[tokio::test]
    async fn test_from_candidates_skips_non_participants() {
        let journal = journal();
        let candidates = vec![
            Candidate::participant(RecordingUnit::new("repo", &journal)),
            Candidate::other("system clock"),
            Candidate::participant(RecordingUnit::new("outbox", &journal)),
        ];

        let coordinator = Coordinator::from_candidates(candidates, sink())
            .await
            .unwrap();

        assert_eq!(coordinator.participant_names(), vec!["repo", "outbox"]);
        assert_eq!(entries(&journal), vec!["begin:repo", "begin:outbox"]);
        coordinator.close().await.unwrap();
    }

    #[derive(Default)]
    struct CacheFlush {
        flushed: AtomicUsize,
        discarded: AtomicUsize,
    }

    impl Enlistment for CacheFlush {
        fn on_complete(&self) {
            self.flushed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_expire(&self) {
            self.discarded.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_ambient_scope_completes_only_after_commit() {
        let journal = journal();
        let cache = Arc::new(CacheFlush::default());

        let mut coordinator = Coordinator::begin(units(1, &journal), sink()).await.unwrap();
        let enlisted = cache.clone();
        coordinator
            .run(move || {
                let ambient = Ambient::current().expect("ambient scope in action");
                ambient.enlist(enlisted).map_err(|e| OrderRejected(e.to_string()))
            })
            .await
            .unwrap();

        assert_eq!(cache.flushed.load(Ordering::SeqCst), 1);
        assert_eq!(cache.discarded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ambient_scope_expires_on_commit_failure() {
        let journal = journal();
        let cache = Arc::new(CacheFlush::default());
        let participants = vec![RecordingUnit::new("ledger", &journal).failing_commit().shared()];

        let mut coordinator = Coordinator::begin(participants, sink()).await.unwrap();
        let enlisted = cache.clone();
        let result = coordinator
            .run_async(move || async move {
                tokio::task::yield_now().await;
                Ambient::current()
                    .expect("ambient scope across await")
                    .enlist(enlisted)
                    .map_err(|e| OrderRejected(e.to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(cache.flushed.load(Ordering::SeqCst), 0);
        assert_eq!(cache.discarded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_metrics_track_outcomes() {
        let journal = journal();
        let metrics = Arc::new(CoordinatorMetrics::new());

        let mut ok = Coordinator::with_config(
            units(2, &journal),
            sink(),
            CoordinatorConfig::default(),
            metrics.clone(),
        )
        .await
        .unwrap();
        ok.run(|| Ok::<_, OrderRejected>(())).await.unwrap();

        let mut failing = Coordinator::with_config(
            units(2, &journal),
            sink(),
            CoordinatorConfig::default(),
            metrics.clone(),
        )
        .await
        .unwrap();
        let _ = failing.run(|| Err(OrderRejected("x".into()))).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.scopes_opened, 2);
        assert_eq!(snapshot.runs_started, 2);
        assert_eq!(snapshot.commits, 1);
        assert_eq!(snapshot.rollbacks, 1);
        assert_eq!(snapshot.action_failures, 1);
        assert_eq!(snapshot.participants_begun, 4);
    }

    proptest! {
        #[test]
        fn prop_success_begins_and_commits_each_once(n in 0usize..8) {
            let journal = journal();
            tokio_test::block_on(async {
                let mut coordinator = Coordinator::begin(units(n, &journal), sink()).await.unwrap();
                coordinator.run(|| Ok::<_, OrderRejected>(())).await.unwrap();
            });

            let expected: Vec<String> = (0..n)
                .map(|i| format!("begin:p{}", i))
                .chain((0..n).map(|i| format!("commit:p{}", i)))
                .collect();
            prop_assert_eq!(entries(&journal), expected);
        }

        #[test]
        fn prop_action_failure_rolls_back_each_once(n in 0usize..8) {
            let journal = journal();
            let err = tokio_test::block_on(async {
                let mut coordinator = Coordinator::begin(units(n, &journal), sink()).await.unwrap();
                coordinator.run(|| Err(OrderRejected("fail".into()))).await.unwrap_err()
            });

            prop_assert!(err.action_error().is_some());
            prop_assert_eq!(count(&journal, "begin:"), n);
            prop_assert_eq!(count(&journal, "commit:"), 0);
            for i in 0..n {
                prop_assert_eq!(count(&journal, &format!("rollback:p{}", i)), 1);
            }
        }

        #[test]
        fn prop_commit_failure_rolls_back_all(
            (n, failing) in (2usize..8).prop_flat_map(|n| (Just(n), 0..n))
        ) {
            let journal = journal();
            let participants: Vec<Arc<dyn UnitOfWork>> = (0..n)
                .map(|i| {
                    let unit = RecordingUnit::new(&format!("p{}", i), &journal);
                    if i == failing { unit.failing_commit().shared() } else { unit.shared() }
                })
                .collect();

            let err = tokio_test::block_on(async {
                let mut coordinator = Coordinator::begin(participants, sink()).await.unwrap();
                coordinator.run(|| Ok::<_, OrderRejected>(())).await.unwrap_err()
            });

            let failing_name = format!("p{}", failing);
            prop_assert_eq!(err.participant(), Some(failing_name.as_str()));
            prop_assert_eq!(count(&journal, "commit:"), failing + 1);
            prop_assert_eq!(count(&journal, "rollback:"), n);
        }
    }
}
