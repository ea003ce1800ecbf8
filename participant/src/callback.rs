//! Unit of work that forwards each phase to a closure.

use unitwork_common::Result;

use crate::unit::UnitOfWork;

type PhaseCallback = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Unit of work built from callbacks.
///
/// Phases without a callback succeed without doing anything, which keeps
/// `rollback` idempotent unless the supplied callback says otherwise.
pub struct CallbackUnit {
    name: String,
    on_begin: Option<PhaseCallback>,
    on_commit: Option<PhaseCallback>,
    on_rollback: Option<PhaseCallback>,
}

impl CallbackUnit {
    /// Create a new callback unit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_begin: None,
            on_commit: None,
            on_rollback: None,
        }
    }

    /// Set begin callback.
    pub fn on_begin<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.on_begin = Some(Box::new(callback));
        self
    }

    /// Set commit callback.
    pub fn on_commit<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.on_commit = Some(Box::new(callback));
        self
    }

    /// Set rollback callback.
    pub fn on_rollback<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.on_rollback = Some(Box::new(callback));
        self
    }

    fn invoke(callback: &Option<PhaseCallback>) -> Result<()> {
        match callback {
            Some(callback) => callback(),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl UnitOfWork for CallbackUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> Result<()> {
        Self::invoke(&self.on_begin)
    }

    async fn commit(&self) -> Result<()> {
        Self::invoke(&self.on_commit)
    }

    async fn rollback(&self) -> Result<()> {
        Self::invoke(&self.on_rollback)
    }
}
