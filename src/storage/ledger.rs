// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger of Teller data backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: account id → serialized StoredAccount
//! - `balance_snapshots`: composite key (account id|as_of micros) → serialized BalanceSnapshot
//! - `transactions`: transaction id → serialized StoredTransaction
//! - `account_transactions`: composite key (account id|transaction id) → ()

use std::{path::Path, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::models::{BalanceSnapshot, StoredAccount, StoredTransaction};

// =============================================================================
// Table Definitions
// =============================================================================

const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// Key format: `account_id | 0x00 | as_of_micros_be`, ascending by time.
const BALANCE_SNAPSHOTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("balance_snapshots");

const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Key format: `account_id | 0x00 | transaction_id`.
const ACCOUNT_TRANSACTIONS: TableDefinition<&[u8], ()> =
    TableDefinition::new("account_transactions");

const KEY_SEPARATOR: u8 = 0x00;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid {field} in Teller record: {reason}")]
    InvalidRecord { field: &'static str, reason: String },

    #[error("balance snapshot for {account_id} at {as_of} already exists")]
    DuplicateSnapshot {
        account_id: String,
        as_of: DateTime<Utc>,
    },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Key Helpers
// =============================================================================

fn snapshot_key(account_id: &str, as_of: &DateTime<Utc>) -> Vec<u8> {
    let mut key = account_prefix(account_id);
    key.extend_from_slice(&(as_of.timestamp_micros() as u64).to_be_bytes());
    key
}

fn account_transaction_key(account_id: &str, transaction_id: &str) -> Vec<u8> {
    let mut key = account_prefix(account_id);
    key.extend_from_slice(transaction_id.as_bytes());
    key
}

fn account_prefix(account_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(account_id.len() + 1 + 8);
    prefix.extend_from_slice(account_id.as_bytes());
    prefix.push(KEY_SEPARATOR);
    prefix
}

/// Exclusive upper bound for every key under `account_prefix`.
fn account_prefix_end(account_id: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(account_id.len() + 1);
    end.extend_from_slice(account_id.as_bytes());
    end.push(KEY_SEPARATOR + 1);
    end
}

// =============================================================================
// Teller JSON Extraction
// =============================================================================

fn required_str<'a>(value: &'a Value, field: &'static str) -> LedgerResult<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LedgerError::InvalidRecord {
            field,
            reason: "missing or not a string".to_string(),
        })
}

fn optional_str(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Teller sends amounts as strings ("100.00"); numbers are accepted too.
/// Missing or null counts as zero.
fn decimal_field(value: &Value, field: &'static str) -> LedgerResult<Decimal> {
    let invalid = |reason: String| LedgerError::InvalidRecord { field, reason };
    match value.get(field) {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).map_err(|e| invalid(e.to_string())),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).map_err(|e| invalid(e.to_string())),
        Some(other) => Err(invalid(format!("unexpected value {other}"))),
    }
}

fn date_field(value: &Value, field: &'static str) -> LedgerResult<NaiveDate> {
    let raw = required_str(value, field)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| LedgerError::InvalidRecord {
        field,
        reason: format!("{raw:?}: {e}"),
    })
}

// =============================================================================
// LedgerDatabase
// =============================================================================

/// Append/upsert store for accounts, balance snapshots and transactions.
pub struct LedgerDatabase {
    db: Database,
}

impl LedgerDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(BALANCE_SNAPSHOTS)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(ACCOUNT_TRANSACTIONS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create or update an account from a Teller account object.
    ///
    /// `created_at` is kept from the first write; `updated_at` is stamped on
    /// every later one.
    pub fn upsert_account(&self, account: &Value) -> LedgerResult<StoredAccount> {
        let id = required_str(account, "id")?;
        let now = Utc::now();

        let write_txn = self.db.begin_write()?;
        let stored = {
            let mut table = write_txn.open_table(ACCOUNTS)?;

            let existing: Option<StoredAccount> = match table.get(id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            let stored = StoredAccount {
                id: id.to_string(),
                name: optional_str(account, "name"),
                institution_id: account
                    .pointer("/institution/id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                account_type: optional_str(account, "type"),
                subtype: optional_str(account, "subtype"),
                last_four: optional_str(account, "last_four"),
                raw: account.clone(),
                created_at: existing.as_ref().map_or(now, |e| e.created_at),
                updated_at: existing.as_ref().map(|_| now),
            };

            let json = serde_json::to_vec(&stored)?;
            table.insert(id, json.as_slice())?;
            stored
        };
        write_txn.commit()?;
        Ok(stored)
    }

    pub fn get_account(&self, account_id: &str) -> LedgerResult<Option<StoredAccount>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        match table.get(account_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Balance snapshots
    // =========================================================================

    /// Append a snapshot of a Teller balances object, timestamped now.
    pub fn add_balance_snapshot(
        &self,
        account_id: &str,
        balances: &Value,
    ) -> LedgerResult<BalanceSnapshot> {
        self.add_balance_snapshot_at(account_id, balances, Utc::now())
    }

    /// Append a snapshot with an explicit `as_of`. An existing snapshot with
    /// the same key is an error; snapshots are never overwritten.
    pub fn add_balance_snapshot_at(
        &self,
        account_id: &str,
        balances: &Value,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<BalanceSnapshot> {
        let snapshot = BalanceSnapshot {
            account_id: account_id.to_string(),
            available: decimal_field(balances, "available")?,
            ledger: decimal_field(balances, "ledger")?,
            as_of,
            raw: balances.clone(),
        };
        let key = snapshot_key(account_id, &as_of);
        let json = serde_json::to_vec(&snapshot)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BALANCE_SNAPSHOTS)?;
            if table.get(key.as_slice())?.is_some() {
                return Err(LedgerError::DuplicateSnapshot {
                    account_id: account_id.to_string(),
                    as_of,
                });
            }
            table.insert(key.as_slice(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(snapshot)
    }

    /// All snapshots of an account, oldest first.
    pub fn list_balance_snapshots(&self, account_id: &str) -> LedgerResult<Vec<BalanceSnapshot>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCE_SNAPSHOTS)?;

        let start = account_prefix(account_id);
        let end = account_prefix_end(account_id);

        let mut snapshots = Vec::new();
        for entry in table.range(start.as_slice()..end.as_slice())? {
            let (_, value) = entry?;
            snapshots.push(serde_json::from_slice(value.value())?);
        }
        Ok(snapshots)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Insert Teller transaction objects for an account, skipping any id that
    /// is already stored. Returns how many were inserted.
    ///
    /// The batch is atomic: one malformed transaction means nothing from the
    /// batch is written.
    pub fn upsert_transactions(&self, account_id: &str, transactions: &[Value]) -> LedgerResult<usize> {
        let write_txn = self.db.begin_write()?;
        let mut inserted = 0;
        {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
            let mut idx_table = write_txn.open_table(ACCOUNT_TRANSACTIONS)?;

            for raw in transactions {
                let id = required_str(raw, "id")?;
                if tx_table.get(id)?.is_some() {
                    continue;
                }

                let stored = StoredTransaction {
                    id: id.to_string(),
                    account_id: account_id.to_string(),
                    date: date_field(raw, "date")?,
                    description: optional_str(raw, "description"),
                    amount: decimal_field(raw, "amount")?,
                    raw: raw.clone(),
                };

                let json = serde_json::to_vec(&stored)?;
                tx_table.insert(id, json.as_slice())?;
                let key = account_transaction_key(account_id, id);
                idx_table.insert(key.as_slice(), ())?;
                inserted += 1;
            }
        }
        write_txn.commit()?;
        Ok(inserted)
    }

    pub fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<StoredTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(transaction_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Transactions of an account ordered by date, then id.
    pub fn list_transactions(&self, account_id: &str) -> LedgerResult<Vec<StoredTransaction>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(ACCOUNT_TRANSACTIONS)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let start = account_prefix(account_id);
        let end = account_prefix_end(account_id);
        let prefix_len = start.len();

        let mut transactions = Vec::new();
        for entry in idx_table.range(start.as_slice()..end.as_slice())? {
            let (key, _) = entry?;
            let Ok(transaction_id) = std::str::from_utf8(&key.value()[prefix_len..]) else {
                continue;
            };
            if let Some(value) = tx_table.get(transaction_id)? {
                let tx: StoredTransaction = serde_json::from_slice(value.value())?;
                transactions.push(tx);
            }
        }

        transactions.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(transactions)
    }
}

// =============================================================================
// Tests
// =============================================================================
