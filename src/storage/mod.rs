// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage
//!
//! Local persistence for data pulled from Teller by the `sync` command. The
//! proxy routes never touch it.
//!
//! A single redb file holds accounts, balance snapshots and transactions.
//! Its location comes from `LEDGER_PATH` (default `teller-ledger.redb`).

pub mod ledger;

pub use ledger::{LedgerDatabase, LedgerError, LedgerResult};
