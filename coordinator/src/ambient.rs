//! Ambient transaction boundary.
//!
//! A [`TransactionScope`] is an RAII guard. While code runs inside
//! [`TransactionScope::enter`] (async) or [`TransactionScope::enter_sync`],
//! [`Ambient::current`] returns a handle that transaction-aware resources use
//! to [`Ambient::enlist`]. When the guard is dropped every enlistment is told
//! the outcome: completed if [`TransactionScope::complete`] was called, expired
//! otherwise. Dropping is the only release path, so early returns and error
//! paths expire the scope without extra code.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use unitwork_common::{Result, ScopeId, UnitOfWorkError};

tokio::task_local! {
    static CURRENT: Ambient;
}

/// A resource that joins the ambient transaction.
///
/// Callbacks run synchronously while the scope guard is dropped and must not
/// block for long.
pub trait Enlistment: Send + Sync {
    /// Name used in log records.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// The scope completed; make the resource's work durable.
    fn on_complete(&self);

    /// The scope ended without completing; discard the resource's work.
    fn on_expire(&self);
}

/// How a scope ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    Expired,
}

#[derive(Default)]
struct AmbientState {
    enlisted: Vec<Arc<dyn Enlistment>>,
    resolution: Option<Resolution>,
}

struct AmbientInner {
    id: ScopeId,
    state: Mutex<AmbientState>,
}

/// Handle to the ambient transaction of the current task.
#[derive(Clone)]
pub struct Ambient {
    inner: Arc<AmbientInner>,
}

impl Ambient {
    fn new(id: ScopeId) -> Self {
        Self {
            inner: Arc::new(AmbientInner {
                id,
                state: Mutex::new(AmbientState::default()),
            }),
        }
    }

    /// The ambient transaction in scope for the running code, if any.
    pub fn current() -> Option<Ambient> {
        CURRENT.try_with(Ambient::clone).ok()
    }

    /// Scope identifier.
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Join the transaction. Fails once the scope has been resolved.
    pub fn enlist(&self, enlistment: Arc<dyn Enlistment>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.resolution.is_some() {
            return Err(UnitOfWorkError::NotActive);
        }

        debug!(scope_id = %self.inner.id, resource = enlistment.name(), "Resource enlisted");
        state.enlisted.push(enlistment);
        Ok(())
    }

    /// Number of enlisted resources.
    pub fn enlisted_count(&self) -> usize {
        self.inner.state.lock().enlisted.len()
    }

    /// How the scope ended, or `None` while it is still open.
    pub fn resolution(&self) -> Option<Resolution> {
        self.inner.state.lock().resolution
    }

    fn resolve(&self, resolution: Resolution) {
        let enlisted = {
            let mut state = self.inner.state.lock();
            if state.resolution.is_some() {
                return;
            }
            state.resolution = Some(resolution);
            std::mem::take(&mut state.enlisted)
        };

        for enlistment in &enlisted {
            match resolution {
                Resolution::Completed => enlistment.on_complete(),
                Resolution::Expired => enlistment.on_expire(),
            }
        }

        debug!(
            scope_id = %self.inner.id,
            ?resolution,
            enlisted = enlisted.len(),
            "Transaction scope resolved"
        );
    }
}

/// Scoped ambient transaction. Expires on drop unless completed.
pub struct TransactionScope {
    ambient: Ambient,
    completed: bool,
}

impl TransactionScope {
    /// Open a new scope.
    pub fn new() -> Self {
        Self::with_id(ScopeId::new())
    }

    /// Open a new scope with a caller-chosen identifier.
    pub fn with_id(id: ScopeId) -> Self {
        Self {
            ambient: Ambient::new(id),
            completed: false,
        }
    }

    /// Handle to this scope's ambient transaction.
    pub fn ambient(&self) -> Ambient {
        self.ambient.clone()
    }

    /// Run a future with this scope as the ambient transaction.
    ///
    /// The scope stays visible across every suspension point of `future`.
    pub async fn enter<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self.ambient.clone(), future).await
    }

    /// Run a closure with this scope as the ambient transaction.
    pub fn enter_sync<R>(&self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self.ambient.clone(), f)
    }

    /// Mark the scope as successful. Takes effect when the scope is dropped.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    /// Check if [`TransactionScope::complete`] was called.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Default for TransactionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        let resolution = if self.completed {
            Resolution::Completed
        } else {
            Resolution::Expired
        };
        self.ambient.resolve(resolution);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        completed: AtomicUsize,
        expired: AtomicUsize,
    }

    impl Enlistment for Counter {
        fn on_complete(&self) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_expire(&self) {
            self.expired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_completed_scope_notifies_enlistments() {
        let counter = Arc::new(Counter::default());
        let mut scope = TransactionScope::new();
        let ambient = scope.ambient();

        let enlisted = counter.clone();
        scope
            .enter(async move {
                tokio::task::yield_now().await;
                Ambient::current().unwrap().enlist(enlisted).unwrap();
            })
            .await;

        scope.complete();
        drop(scope);

        assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
        assert_eq!(counter.expired.load(Ordering::SeqCst), 0);
        assert_eq!(ambient.resolution(), Some(Resolution::Completed));
    }

    #[test]
    fn test_dropped_scope_expires() {
        let counter = Arc::new(Counter::default());
        let scope = TransactionScope::new();
        let ambient = scope.ambient();

        scope.enter_sync(|| {
            Ambient::current().unwrap().enlist(counter.clone()).unwrap();
        });
        assert_eq!(ambient.enlisted_count(), 1);
        drop(scope);

        assert_eq!(counter.expired.load(Ordering::SeqCst), 1);
        assert_eq!(ambient.resolution(), Some(Resolution::Expired));
        assert!(ambient.enlist(counter).is_err());
    }

    #[test]
    fn test_no_ambient_outside_scope() {
        let _scope = TransactionScope::new();
        assert!(Ambient::current().is_none());
    }
}
