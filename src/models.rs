// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Records
//!
//! Rows persisted by [`crate::storage::LedgerDatabase`]. The proxy itself never
//! reads these; they exist for the `sync` command and for later querying.
//!
//! Each record keeps the `raw` Teller JSON next to the extracted columns so
//! nothing the provider sent is lost.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account, keyed by the Teller account id. Upserted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredAccount {
    pub id: String,
    pub name: Option<String>,
    pub institution_id: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub last_four: Option<String>,
    pub raw: Value,
    pub created_at: DateTime<Utc>,
    /// Unset until the account is written a second time.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Point-in-time balance. Unique per (account, `as_of`); never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceSnapshot {
    pub account_id: String,
    pub available: Decimal,
    pub ledger: Decimal,
    pub as_of: DateTime<Utc>,
    pub raw: Value,
}

/// Transaction, keyed by the Teller transaction id. Inserted at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredTransaction {
    pub id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub amount: Decimal,
    pub raw: Value,
}
