// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::providers::TellerClient;

/// Shared, read-only handler state.
///
/// Holds the base Teller client built at startup. Handlers never mutate it;
/// they call [`TellerClient::bind`] to get a per-request client.
#[derive(Clone, Debug)]
pub struct AppState {
    pub teller: TellerClient,
    pub require_access_token: bool,
}

impl AppState {
    pub fn new(teller: TellerClient, require_access_token: bool) -> Self {
        Self {
            teller,
            require_access_token,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(
            TellerClient::new(None).expect("plain client builds"),
            false,
        )
    }
}
