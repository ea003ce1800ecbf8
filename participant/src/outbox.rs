//! Transactional outbox.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use unitwork_common::{Result, UnitOfWorkError};

use crate::config::OutboxConfig;
use crate::unit::UnitOfWork;

/// Message publisher that only releases messages when the transaction commits.
///
/// Messages passed to [`Outbox::publish`] are held until `commit`, then sent
/// in publish order to the channel returned by [`Outbox::new`]. `rollback`
/// drops them.
pub struct Outbox<M> {
    name: String,
    sender: mpsc::Sender<M>,
    /// `None` when no transaction is open.
    staged: Mutex<Option<Vec<M>>>,
    max_staged: usize,
}

impl<M: Send + 'static> Outbox<M> {
    /// Create a new outbox and the receiving end of its channel.
    pub fn new(name: impl Into<String>, config: OutboxConfig) -> (Self, mpsc::Receiver<M>) {
        let (sender, receiver) = mpsc::channel(config.channel_capacity);

        let outbox = Self {
            name: name.into(),
            sender,
            staged: Mutex::new(None),
            max_staged: config.max_staged,
        };

        (outbox, receiver)
    }

    /// Stage a message for publication on commit.
    pub fn publish(&self, message: M) -> Result<()> {
        let mut staged = self.staged.lock();
        let buffer = staged.as_mut().ok_or(UnitOfWorkError::NotActive)?;

        if buffer.len() >= self.max_staged {
            return Err(UnitOfWorkError::Conflict(format!(
                "outbox {} already holds {} staged messages",
                self.name, self.max_staged
            )));
        }

        buffer.push(message);
        Ok(())
    }

    /// Number of messages waiting for commit.
    pub fn staged_count(&self) -> usize {
        self.staged.lock().as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Check if a transaction is open.
    pub fn is_active(&self) -> bool {
        self.staged.lock().is_some()
    }
}

#[async_trait::async_trait]
impl<M: Send + 'static> UnitOfWork for Outbox<M> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> Result<()> {
        let mut staged = self.staged.lock();
        if staged.is_some() {
            return Err(UnitOfWorkError::AlreadyActive);
        }
        *staged = Some(Vec::new());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let messages = self
            .staged
            .lock()
            .take()
            .ok_or(UnitOfWorkError::NotActive)?;

        let count = messages.len();
        for message in messages {
            self.sender.send(message).await.map_err(|_| {
                UnitOfWorkError::Unavailable(format!("outbox {} receiver closed", self.name))
            })?;
        }

        info!(outbox = %self.name, count, "Outbox messages published");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if let Some(discarded) = self.staged.lock().take() {
            debug!(outbox = %self.name, discarded = discarded.len(), "Outbox messages discarded");
        }
        Ok(())
    }
}
