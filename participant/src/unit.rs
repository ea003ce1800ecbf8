//! The unit of work capability.

use std::any::Any;
use std::sync::Arc;

use unitwork_common::Result;

/// A transactional resource that can begin, commit, or roll back independently.
///
/// Implementations own their transactional logic; a coordinator only sequences
/// the three calls across every registered unit.
///
/// # Contract
///
/// - `begin` is called exactly once per coordinator, before any work runs.
/// - `commit` makes the work durable. It is called at most once.
/// - `rollback` discards the work. It **must** be safe to call when no
///   transaction is outstanding, including after a successful commit or a
///   previous rollback, and must then be a no-op. Coordinators may call it
///   more than once on the same unit when a failing run is followed by
///   disposal.
#[async_trait::async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Name used as the key of diagnostic records.
    ///
    /// Defaults to the implementing type's name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Open a transaction on the underlying resource.
    async fn begin(&self) -> Result<()>;

    /// Make the work done since `begin` durable.
    async fn commit(&self) -> Result<()>;

    /// Discard the work done since `begin`. Idempotent.
    async fn rollback(&self) -> Result<()>;
}

/// An object offered to a coordinator that may or may not be a unit of work.
///
/// Lets callers hand over a mixed bag of collaborators (repositories, caches,
/// clocks) and have only the units registered.
#[derive(Clone)]
pub enum Candidate {
    /// A participant that will be registered and begun.
    Participant(Arc<dyn UnitOfWork>),
    /// Anything else. Skipped during registration.
    Other(Arc<dyn Any + Send + Sync>),
}

impl Candidate {
    /// Wrap a unit of work.
    pub fn participant<U>(unit: U) -> Self
    where
        U: UnitOfWork + 'static,
    {
        Candidate::Participant(Arc::new(unit))
    }

    /// Wrap an arbitrary collaborator that does not take part in transactions.
    pub fn other<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Candidate::Other(Arc::new(value))
    }

    /// Return the unit of work if this candidate is one.
    pub fn into_participant(self) -> Option<Arc<dyn UnitOfWork>> {
        match self {
            Candidate::Participant(unit) => Some(unit),
            Candidate::Other(_) => None,
        }
    }

    /// Check if this candidate is a unit of work.
    pub fn is_participant(&self) -> bool {
        matches!(self, Candidate::Participant(_))
    }
}

impl From<Arc<dyn UnitOfWork>> for Candidate {
    fn from(unit: Arc<dyn UnitOfWork>) -> Self {
        Candidate::Participant(unit)
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Candidate::Participant(unit) => f.debug_tuple("Participant").field(&unit.name()).finish(),
            Candidate::Other(_) => f.debug_tuple("Other").finish(),
        }
    }
}
