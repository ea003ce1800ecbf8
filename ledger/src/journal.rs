//! Journal entry types for double-entry bookkeeping.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::account::AccountId;

/// Type of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Funds leave the account.
    Debit,
    /// Funds arrive in the account.
    Credit,
}

/// A single journal entry in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Batch (one unit of work) this entry was staged in.
    pub batch_id: Uuid,
    /// Account affected.
    pub account_id: AccountId,
    /// Entry type (debit or credit).
    pub entry_type: EntryType,
    /// Amount, always positive.
    pub amount: Decimal,
    /// Currency code.
    pub currency: String,
}

impl JournalEntry {
    /// Create a debit entry.
    pub fn debit(
        batch_id: Uuid,
        account_id: AccountId,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self::new(batch_id, account_id, EntryType::Debit, amount, currency)
    }

    /// Create a credit entry.
    pub fn credit(
        batch_id: Uuid,
        account_id: AccountId,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self::new(batch_id, account_id, EntryType::Credit, amount, currency)
    }

    fn new(
        batch_id: Uuid,
        account_id: AccountId,
        entry_type: EntryType,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            batch_id,
            account_id,
            entry_type,
            amount,
            currency: currency.into(),
        }
    }

    /// Effect of this entry on the account balance.
    pub fn balance_delta(&self) -> Decimal {
        match self.entry_type {
            EntryType::Debit => -self.amount,
            EntryType::Credit => self.amount,
        }
    }
}

/// Journal entries staged by one unit of work, applied together on commit.
#[derive(Debug, Clone)]
pub struct JournalBatch {
    /// Batch ID.
    pub id: Uuid,
    /// Entries in the batch.
    pub entries: Vec<JournalEntry>,
}

impl JournalBatch {
    /// Create a new, empty batch.
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            entries: Vec::new(),
        }
    }

    /// Add an entry to the batch.
    pub fn add_entry(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// Verify the batch is balanced (debits == credits per currency).
    pub fn is_balanced(&self) -> bool {
        let mut totals: HashMap<&str, Decimal> = HashMap::new();

        for entry in &self.entries {
            *totals.entry(entry.currency.as_str()).or_insert(Decimal::ZERO) +=
                entry.balance_delta();
        }

        totals.values().all(|total| total.is_zero())
    }

    /// Net balance change per account.
    pub fn net_by_account(&self) -> HashMap<AccountId, Decimal> {
        let mut net: HashMap<AccountId, Decimal> = HashMap::new();

        for entry in &self.entries {
            *net.entry(entry.account_id.clone()).or_insert(Decimal::ZERO) +=
                entry.balance_delta();
        }

        net
    }

    /// Check if the batch has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for JournalBatch {
    fn default() -> Self {
        Self::new()
    }
}
