// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Teller Proxy - mTLS-authenticated HTTP proxy for the Teller banking API
//!
//! Browser and mobile clients call this service with their Teller access
//! token; the service forwards each call to `api.teller.io` using the
//! operator's client certificate and relays Teller's answer unchanged.
//!
//! ## Modules
//!
//! - `api` - HTTP route table and handlers (Axum)
//! - `auth` - Access token extraction from the `Authorization` header
//! - `config` - Environment variables, credential resolution
//! - `providers` - Teller API client
//! - `server` - Startup sequence: configuration, then listener
//! - `storage` - Local ledger (redb) filled by the `sync` command
//! - `sync` - Ledger sync against Teller

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod server;
pub mod state;
pub mod storage;
pub mod sync;
