//! Core ledger engine and its unit of work.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use unitwork_common::{Result, UnitOfWorkError};
use unitwork_participant::UnitOfWork;

use crate::account::{Account, AccountId};
use crate::journal::{JournalBatch, JournalEntry};

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Allow balances to go negative on commit.
    pub allow_overdraft: bool,
    /// Maximum entries a single unit may stage.
    pub max_batch_entries: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            allow_overdraft: false,
            max_batch_entries: 10_000,
        }
    }
}

/// The ledger engine holds committed accounts and the journal.
///
/// Writes go through a [`LedgerUnit`] obtained from [`LedgerEngine::unit`]:
/// transfers are staged in the unit and applied here only when it commits.
pub struct LedgerEngine {
    config: LedgerConfig,
    accounts: DashMap<AccountId, Account>,
    journal: RwLock<Vec<JournalEntry>>,
    /// Serializes validate-then-apply across units committing concurrently.
    commit_lock: Mutex<()>,
}

impl LedgerEngine {
    /// Create a new ledger engine.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            accounts: DashMap::new(),
            journal: RwLock::new(Vec::new()),
            commit_lock: Mutex::new(()),
        }
    }

    /// Open an account with an opening balance.
    pub fn open_account(
        &self,
        id: impl Into<AccountId>,
        currency: impl Into<String>,
        opening_balance: Decimal,
    ) -> Result<AccountId> {
        let account = Account::new(id, currency, opening_balance);
        let id = account.id.clone();

        match self.accounts.entry(id.clone()) {
            Entry::Occupied(_) => {
                Err(UnitOfWorkError::Conflict(format!("account {} already exists", id)))
            }
            Entry::Vacant(slot) => {
                slot.insert(account);
                info!(account = %id, balance = %opening_balance, "Account opened");
                Ok(id)
            }
        }
    }

    /// Get a copy of an account.
    pub fn account(&self, id: &AccountId) -> Option<Account> {
        self.accounts.get(id).map(|a| a.clone())
    }

    /// Get committed balance.
    pub fn balance(&self, id: &AccountId) -> Result<Decimal> {
        self.accounts
            .get(id)
            .map(|a| a.balance)
            .ok_or_else(|| UnitOfWorkError::Storage(format!("account {} not found", id)))
    }

    /// Freeze an account so that commits touching it fail.
    pub fn freeze(&self, id: &AccountId) -> bool {
        // Must not interleave with a batch between validation and apply
        let _guard = self.commit_lock.lock();

        match self.accounts.get_mut(id) {
            Some(mut account) => {
                account.freeze();
                true
            }
            None => false,
        }
    }

    /// Number of committed journal entries.
    pub fn journal_len(&self) -> usize {
        self.journal.read().len()
    }

    /// Verify ledger integrity: every committed batch is balanced.
    pub fn verify_integrity(&self) -> bool {
        let journal = self.journal.read();
        let mut batches: std::collections::HashMap<uuid::Uuid, JournalBatch> =
            std::collections::HashMap::new();

        for entry in journal.iter() {
            batches
                .entry(entry.batch_id)
                .or_insert_with(|| JournalBatch {
                    id: entry.batch_id,
                    entries: Vec::new(),
                })
                .add_entry(entry.clone());
        }

        batches.values().all(JournalBatch::is_balanced)
    }

    /// Create a unit of work against this ledger.
    pub fn unit(self: &Arc<Self>, name: impl Into<String>) -> LedgerUnit {
        LedgerUnit {
            name: name.into(),
            engine: Arc::clone(self),
            pending: Mutex::new(None),
        }
    }

    fn validate_entry_account(&self, id: &AccountId, currency: &str) -> Result<()> {
        let account = self
            .accounts
            .get(id)
            .ok_or_else(|| UnitOfWorkError::Storage(format!("account {} not found", id)))?;

        if account.currency != currency {
            return Err(UnitOfWorkError::Conflict(format!(
                "account {} holds {}, not {}",
                id, account.currency, currency
            )));
        }

        Ok(())
    }

    /// Validate and apply a batch atomically.
    #[instrument(skip(self, batch), fields(batch_id = %batch.id, entries = batch.entries.len()))]
    fn apply(&self, batch: JournalBatch) -> Result<()> {
        if !batch.is_balanced() {
            return Err(UnitOfWorkError::Conflict(format!(
                "batch {} is not balanced",
                batch.id
            )));
        }

        let _guard = self.commit_lock.lock();

        let net = batch.net_by_account();
        let mut updates = Vec::with_capacity(net.len());

        for (id, delta) in &net {
            let account = self
                .accounts
                .get(id)
                .ok_or_else(|| UnitOfWorkError::Storage(format!("account {} not found", id)))?;

            if !account.can_transact() {
                return Err(UnitOfWorkError::Conflict(format!(
                    "account {} is {:?}",
                    id, account.status
                )));
            }

            let new_balance = account.balance + delta;
            if new_balance < Decimal::ZERO && !self.config.allow_overdraft {
                return Err(UnitOfWorkError::Conflict(format!(
                    "insufficient funds in {}: balance {}, change {}",
                    id, account.balance, delta
                )));
            }

            updates.push((id.clone(), new_balance));
        }

        for (id, new_balance) in updates {
            if let Some(mut account) = self.accounts.get_mut(&id) {
                account.balance = new_balance;
            }
        }

        info!(batch_id = %batch.id, entries = batch.entries.len(), "Batch applied");
        self.journal.write().extend(batch.entries);
        Ok(())
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

/// Unit of work that stages ledger transfers until commit.
pub struct LedgerUnit {
    name: String,
    engine: Arc<LedgerEngine>,
    /// `None` when no transaction is open.
    pending: Mutex<Option<JournalBatch>>,
}

impl LedgerUnit {
    /// Stage a transfer between two accounts of the same currency.
    pub fn transfer(&self, from: &AccountId, to: &AccountId, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(UnitOfWorkError::Conflict(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }
        if from == to {
            return Err(UnitOfWorkError::Conflict(
                "source and destination must differ".to_string(),
            ));
        }

        let currency = self
            .engine
            .account(from)
            .map(|a| a.currency)
            .ok_or_else(|| UnitOfWorkError::Storage(format!("account {} not found", from)))?;
        self.engine.validate_entry_account(to, &currency)?;

        let mut pending = self.pending.lock();
        let batch = pending.as_mut().ok_or(UnitOfWorkError::NotActive)?;

        if batch.entries.len() + 2 > self.engine.config.max_batch_entries {
            return Err(UnitOfWorkError::Conflict(format!(
                "unit {} exceeds {} staged entries",
                self.name, self.engine.config.max_batch_entries
            )));
        }

        let batch_id = batch.id;
        batch.add_entry(JournalEntry::debit(batch_id, from.clone(), amount, &currency));
        batch.add_entry(JournalEntry::credit(batch_id, to.clone(), amount, &currency));

        debug!(unit = %self.name, from = %from, to = %to, amount = %amount, "Transfer staged");
        Ok(())
    }

}

#[async_trait::async_trait]
impl UnitOfWork for LedgerUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return Err(UnitOfWorkError::AlreadyActive);
        }
        *pending = Some(JournalBatch::new());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let batch = self.pending.lock().take().ok_or(UnitOfWorkError::NotActive)?;

        if batch.is_empty() {
            return Ok(());
        }

        self.engine.apply(batch)
    }

    async fn rollback(&self) -> Result<()> {
        if let Some(batch) = self.pending.lock().take() {
            debug!(unit = %self.name, discarded = batch.entries.len(), "Ledger batch discarded");
        }
        Ok(())
    }
}
