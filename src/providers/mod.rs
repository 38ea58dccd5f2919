// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Upstream banking-data providers.

pub mod teller;

pub use teller::{TellerClient, TellerError, UpstreamResponse, TELLER_API_BASE_URL};
