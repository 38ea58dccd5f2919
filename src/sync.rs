// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Sync
//!
//! Pulls everything visible to one access token from Teller into the local
//! ledger:
//!
//! 1. `GET /accounts`, each account upserted
//! 2. `GET /accounts/{id}/balances` per account, appended as a snapshot
//! 3. `GET /accounts/{id}/transactions` per account, new ids inserted
//!
//! A sync is not transactional across accounts. A failure part-way leaves
//! the accounts already processed in place; re-running is safe since account
//! writes are upserts and transaction writes skip known ids.

use serde_json::Value;
use tracing::{debug, info};

use crate::{
    providers::{TellerClient, TellerError, UpstreamResponse},
    storage::{LedgerDatabase, LedgerError},
};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Teller(#[from] TellerError),

    #[error("Teller returned {status} for {path}")]
    Upstream { path: String, status: u16 },

    #[error("Teller returned malformed JSON for {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected Teller response for {path}: {reason}")]
    InvalidResponse { path: String, reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What one sync run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub accounts: usize,
    pub balance_snapshots: usize,
    pub transactions_inserted: usize,
}

/// Run one sync with `client`, which must already be bound to a token.
pub async fn sync_ledger(
    client: &TellerClient,
    ledger: &LedgerDatabase,
) -> Result<SyncSummary, SyncError> {
    let mut summary = SyncSummary::default();

    let accounts = expect_array("/accounts", client.list_accounts().await?)?;
    info!(count = accounts.len(), "Fetched Teller accounts");

    for account in &accounts {
        let stored = ledger.upsert_account(account)?;
        summary.accounts += 1;
        let account_id = stored.id.as_str();

        let path = format!("/accounts/{account_id}/balances");
        let balances = decode(&path, client.get_account_balances(account_id).await?)?;
        ledger.add_balance_snapshot(account_id, &balances)?;
        summary.balance_snapshots += 1;

        let path = format!("/accounts/{account_id}/transactions");
        let transactions =
            expect_array(&path, client.list_account_transactions(account_id).await?)?;
        let inserted = ledger.upsert_transactions(account_id, &transactions)?;
        summary.transactions_inserted += inserted;

        debug!(
            account_id = %account_id,
            fetched = transactions.len(),
            inserted,
            "Synced account"
        );
    }

    info!(
        accounts = summary.accounts,
        balance_snapshots = summary.balance_snapshots,
        transactions_inserted = summary.transactions_inserted,
        "Ledger sync complete"
    );

    Ok(summary)
}

fn decode(path: &str, response: UpstreamResponse) -> Result<Value, SyncError> {
    if !(200..300).contains(&response.status) {
        return Err(SyncError::Upstream {
            path: path.to_string(),
            status: response.status,
        });
    }
    let body = response.body.ok_or_else(|| SyncError::InvalidResponse {
        path: path.to_string(),
        reason: "empty body".to_string(),
    })?;
    serde_json::from_slice(&body).map_err(|source| SyncError::Json {
        path: path.to_string(),
        source,
    })
}

fn expect_array(path: &str, response: UpstreamResponse) -> Result<Vec<Value>, SyncError> {
    match decode(path, response)? {
        Value::Array(items) => Ok(items),
        other => Err(SyncError::InvalidResponse {
            path: path.to_string(),
            reason: format!("expected an array, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;

    fn client_for(server: &MockServer) -> TellerClient {
        TellerClient::new(None)
            .unwrap()
            .with_base_url(&server.base_url())
            .unwrap()
            .bind(Some("tok_sync"))
    }

    fn temp_ledger() -> (LedgerDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDatabase::open(&dir.path().join("ledger.redb")).unwrap();
        (db, dir)
    }

    async fn mock_account(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/accounts");
                then.status(200).json_body(json!([
                    { "id": "acc_1", "name": "Checking", "type": "depository",
                      "institution": { "id": "chase" } }
                ]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/accounts/acc_1/balances");
                then.status(200).json_body(json!({
                    "account_id": "acc_1", "available": "93.45", "ledger": "100.00"
                }));
            })
            .await;
    }

    #[tokio::test]
    async fn sync_writes_accounts_balances_and_transactions() {
        let server = MockServer::start_async().await;
        mock_account(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/accounts/acc_1/transactions");
                then.status(200).json_body(json!([
                    { "id": "txn_1", "date": "2024-05-01", "amount": "-6.55", "description": "Lunch" },
                    { "id": "txn_2", "date": "2024-05-02", "amount": "-20.00" }
                ]));
            })
            .await;

        let (ledger, _dir) = temp_ledger();
        let client = client_for(&server);

        let first = sync_ledger(&client, &ledger).await.unwrap();
        assert_eq!(
            first,
            SyncSummary {
                accounts: 1,
                balance_snapshots: 1,
                transactions_inserted: 2,
            }
        );

        let second = sync_ledger(&client, &ledger).await.unwrap();
        assert_eq!(second.transactions_inserted, 0);
        assert_eq!(second.balance_snapshots, 1);

        let account = ledger.get_account("acc_1").unwrap().unwrap();
        assert!(account.updated_at.is_some());

        let snapshots = ledger.list_balance_snapshots("acc_1").unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].available, "93.45".parse::<Decimal>().unwrap());

        assert_eq!(ledger.list_transactions("acc_1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sync_sends_the_bound_token() {
        let server = MockServer::start_async().await;
        let accounts = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/accounts")
                    .header_exists("authorization");
                then.status(200).json_body(json!([]));
            })
            .await;

        let (ledger, _dir) = temp_ledger();
        let summary = sync_ledger(&client_for(&server), &ledger).await.unwrap();

        accounts.assert_async().await;
        assert_eq!(summary, SyncSummary::default());
    }

    #[tokio::test]
    async fn upstream_error_status_aborts_sync() {
        let server = MockServer::start_async().await;
        mock_account(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/accounts/acc_1/transactions");
                then.status(404)
                    .json_body(json!({"error": {"code": "not_found"}}));
            })
            .await;

        let (ledger, _dir) = temp_ledger();
        let err = sync_ledger(&client_for(&server), &ledger)
            .await
            .unwrap_err();

        match err {
            SyncError::Upstream { path, status } => {
                assert_eq!(path, "/accounts/acc_1/transactions");
                assert_eq!(status, 404);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Work done before the failure stays.
        assert!(ledger.get_account("acc_1").unwrap().is_some());
    }

    #[tokio::test]
    async fn non_array_account_list_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/accounts");
                then.status(200).json_body(json!({"accounts": []}));
            })
            .await;

        let (ledger, _dir) = temp_ledger();
        let err = sync_ledger(&client_for(&server), &ledger)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidResponse { .. }));
    }
}
