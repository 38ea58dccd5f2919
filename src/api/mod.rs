// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub mod accounts;

/// Route table mirroring Teller's account endpoints under `/api`.
///
/// CORS is fully open: any origin may call with credentials. Browsers reject
/// a literal `*` together with credentials, so the request origin is mirrored
/// instead.
pub fn router(state: AppState) -> Router {
    let account_routes = Router::new()
        .route("/accounts", get(accounts::list_accounts))
        .route(
            "/accounts/{account_id}/details",
            get(accounts::get_account_details),
        )
        .route(
            "/accounts/{account_id}/balances",
            get(accounts::get_account_balances),
        )
        .route(
            "/accounts/{account_id}/transactions",
            get(accounts::list_account_transactions),
        )
        .route(
            "/accounts/{account_id}/payments/{scheme}/payees",
            get(accounts::list_account_payees).post(accounts::create_account_payee),
        )
        .route(
            "/accounts/{account_id}/payments/{scheme}",
            post(accounts::create_account_payment),
        )
        .with_state(state);

    Router::new()
        .nest("/api", account_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::very_permissive())
}
