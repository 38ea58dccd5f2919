// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account, balance, transaction and payment passthrough endpoints.
//!
//! Every handler follows the same steps: bind the caller's token to the base
//! Teller client, make exactly one upstream call, then copy the upstream
//! status and JSON body into the response without touching the payload.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::de::IgnoredAny;
use serde_json::Value;
use tracing::{error, info};

use crate::{
    auth::AccessToken,
    error::ApiError,
    providers::{TellerError, UpstreamResponse},
    state::AppState,
};

pub async fn list_accounts(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
) -> Result<Response, ApiError> {
    let client = state.teller.bind(token.as_deref());
    relay("list_accounts", client.has_access_token(), client.list_accounts().await)
}

pub async fn get_account_details(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
    Path(account_id): Path<String>,
) -> Result<Response, ApiError> {
    let client = state.teller.bind(token.as_deref());
    relay(
        "get_account_details",
        client.has_access_token(),
        client.get_account_details(&account_id).await,
    )
}

pub async fn get_account_balances(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
    Path(account_id): Path<String>,
) -> Result<Response, ApiError> {
    let client = state.teller.bind(token.as_deref());
    relay(
        "get_account_balances",
        client.has_access_token(),
        client.get_account_balances(&account_id).await,
    )
}

pub async fn list_account_transactions(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
    Path(account_id): Path<String>,
) -> Result<Response, ApiError> {
    let client = state.teller.bind(token.as_deref());
    relay(
        "list_account_transactions",
        client.has_access_token(),
        client.list_account_transactions(&account_id).await,
    )
}

pub async fn list_account_payees(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
    Path((account_id, scheme)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let client = state.teller.bind(token.as_deref());
    relay(
        "list_account_payees",
        client.has_access_token(),
        client.list_account_payees(&account_id, &scheme).await,
    )
}

pub async fn create_account_payee(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
    Path((account_id, scheme)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body = parse_json_body(&body)?;
    let client = state.teller.bind(token.as_deref());
    relay(
        "create_account_payee",
        client.has_access_token(),
        client
            .create_account_payee(&account_id, &scheme, body.as_ref())
            .await,
    )
}

pub async fn create_account_payment(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
    Path((account_id, scheme)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body = parse_json_body(&body)?;
    let client = state.teller.bind(token.as_deref());
    relay(
        "create_account_payment",
        client.has_access_token(),
        client
            .create_account_payment(&account_id, &scheme, body.as_ref())
            .await,
    )
}

/// An empty inbound body is forwarded as no body at all.
fn parse_json_body(body: &Bytes) -> Result<Option<Value>, ApiError> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::bad_request(format!("Request body is not valid JSON: {e}")))
}

/// Turn an upstream result into the outbound response.
///
/// The status is copied numerically. A non-empty body must parse as JSON and
/// is then sent byte-for-byte; nothing is re-serialised.
fn relay(
    operation: &'static str,
    has_token: bool,
    result: Result<UpstreamResponse, TellerError>,
) -> Result<Response, ApiError> {
    let upstream = result.map_err(|e| {
        error!(operation, has_token, error = %e, "Teller request failed");
        ApiError::internal()
    })?;

    let status = StatusCode::from_u16(upstream.status).map_err(|_| {
        error!(operation, status = upstream.status, "Teller returned an invalid status code");
        ApiError::internal()
    })?;

    let body_len = upstream.body.as_ref().map_or(0, Bytes::len);
    info!(
        operation,
        has_token,
        status = upstream.status,
        body_len,
        "Relaying Teller response"
    );

    let Some(body) = upstream.body else {
        return Ok(status.into_response());
    };

    if let Err(e) = serde_json::from_slice::<IgnoredAny>(&body) {
        error!(operation, status = upstream.status, error = %e, "Teller response body is not JSON");
        return Err(ApiError::internal());
    }

    Ok((
        status,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, Method, Request},
        Router,
    };
    use base64::{engine::general_purpose::STANDARD, Engine};
    use httpmock::MockServer;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::{api::router, providers::TellerClient};

    fn app_for(base_url: &str) -> Router {
        let teller = TellerClient::new(None)
            .unwrap()
            .with_base_url(base_url)
            .unwrap();
        router(AppState::new(teller, false))
    }

    fn basic(token: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{token}:")))
    }

    async fn call(app: Router, method: Method, uri: &str, token: Option<&str>, body: &str) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if !body.is_empty() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[tokio::test]
    async fn balances_scenario_relays_status_and_exact_body() {
        let server = MockServer::start_async().await;
        let upstream = r#"{"available":"100.00","ledger":"120.00"}"#;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET)
                    .path("/accounts/acc_123/balances")
                    .header("authorization", basic("tok_abc"));
                then.status(200)
                    .header("content-type", "application/json")
                    .body(upstream);
            })
            .await;

        let response = call(
            app_for(&server.base_url()),
            Method::GET,
            "/api/accounts/acc_123/balances",
            Some("tok_abc"),
            "",
        )
        .await;

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_bytes(response).await.as_ref(), upstream.as_bytes());
    }

    #[tokio::test]
    async fn every_get_route_hits_its_upstream_path_once() {
        let routes = [
            ("/api/accounts", "/accounts"),
            ("/api/accounts/acc_1/details", "/accounts/acc_1/details"),
            ("/api/accounts/acc_1/balances", "/accounts/acc_1/balances"),
            ("/api/accounts/acc_1/transactions", "/accounts/acc_1/transactions"),
            (
                "/api/accounts/acc_1/payments/zelle/payees",
                "/accounts/acc_1/payments/zelle/payees",
            ),
        ];

        for (inbound, upstream_path) in routes {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(httpmock::Method::GET)
                        .path(upstream_path)
                        .header("authorization", basic("tok_route"));
                    then.status(200).body(r#"{"path":"ok"}"#);
                })
                .await;

            let response = call(
                app_for(&server.base_url()),
                Method::GET,
                inbound,
                Some("tok_route"),
                "",
            )
            .await;

            assert_eq!(response.status(), StatusCode::OK, "route {inbound}");
            mock.assert_hits_async(1).await;
        }
    }

    #[tokio::test]
    async fn upstream_status_is_passed_through() {
        for status in [201u16, 400, 401, 404, 409, 429, 500, 502, 503] {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(httpmock::Method::GET).path("/accounts");
                    then.status(status)
                        .body(r#"{"error":{"code":"upstream","message":"relayed"}}"#);
                })
                .await;

            let response = call(
                app_for(&server.base_url()),
                Method::GET,
                "/api/accounts",
                Some("tok"),
                "",
            )
            .await;

            assert_eq!(response.status().as_u16(), status);
            let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
            assert_eq!(body["error"]["code"], "upstream");
        }
    }

    #[tokio::test]
    async fn empty_upstream_body_gives_empty_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/accounts/acc_1/details");
                then.status(200);
            })
            .await;

        let response = call(
            app_for(&server.base_url()),
            Method::GET,
            "/api/accounts/acc_1/details",
            Some("tok"),
            "",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_fields_and_key_order_survive() {
        let server = MockServer::start_async().await;
        let upstream = r#"[{"zeta":1,"id":"acc_1","links":{"self":"x"},"unexpected":[1.50,null]}]"#;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/accounts");
                then.status(200).body(upstream);
            })
            .await;

        let response = call(
            app_for(&server.base_url()),
            Method::GET,
            "/api/accounts",
            Some("tok"),
            "",
        )
        .await;

        assert_eq!(body_bytes(response).await.as_ref(), upstream.as_bytes());
    }

    #[tokio::test]
    async fn create_payee_scenario_forwards_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/accounts/acc_123/payments/ach/payees")
                    .header("authorization", basic("tok_abc"))
                    .json_body(json!({"name": "Alice"}));
                then.status(201)
                    .header("content-type", "application/json")
                    .json_body(json!({"id": "wpt_1", "name": "Alice", "scheme": "ach"}));
            })
            .await;

        let response = call(
            app_for(&server.base_url()),
            Method::POST,
            "/api/accounts/acc_123/payments/ach/payees",
            Some("tok_abc"),
            r#"{"name":"Alice"}"#,
        )
        .await;

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body, json!({"id": "wpt_1", "name": "Alice", "scheme": "ach"}));
    }

    #[tokio::test]
    async fn create_payment_forwards_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/accounts/acc_123/payments/zelle")
                    .json_body(json!({"amount": "25.00", "payee_id": "wpt_1"}));
                then.status(200).json_body(json!({"id": "wpy_1"}));
            })
            .await;

        let response = call(
            app_for(&server.base_url()),
            Method::POST,
            "/api/accounts/acc_123/payments/zelle",
            Some("tok_abc"),
            r#"{"amount":"25.00","payee_id":"wpt_1"}"#,
        )
        .await;

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_inbound_json_is_rejected_without_upstream_call() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST);
                then.status(201);
            })
            .await;

        let response = call(
            app_for(&server.base_url()),
            Method::POST,
            "/api/accounts/acc_123/payments/ach/payees",
            Some("tok_abc"),
            "{not json",
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn malformed_upstream_json_is_an_internal_error_and_router_keeps_serving() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/accounts/acc_bad/details");
                then.status(200).body("<html>gateway</html>");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/accounts/acc_ok/details");
                then.status(200).body(r#"{"account_id":"acc_ok"}"#);
            })
            .await;

        let app = app_for(&server.base_url());

        let failed = call(app.clone(), Method::GET, "/api/accounts/acc_bad/details", Some("tok"), "").await;
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(&body_bytes(failed).await).unwrap();
        assert_eq!(body, json!({"error": "Internal server error"}));

        let ok = call(app, Method::GET, "/api/accounts/acc_ok/details", Some("tok"), "").await;
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_internal_error() {
        let app = app_for("http://127.0.0.1:1");

        for _ in 0..2 {
            let response = call(app.clone(), Method::GET, "/api/accounts", Some("tok"), "").await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let body = body_bytes(response).await;
            assert!(!String::from_utf8_lossy(&body).contains("127.0.0.1"));
        }
    }

    #[tokio::test]
    async fn token_less_request_is_forwarded_by_default() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/accounts");
                then.status(401)
                    .body(r#"{"error":{"code":"missing_credentials"}}"#);
            })
            .await;

        let response = call(app_for(&server.base_url()), Method::GET, "/api/accounts", None, "").await;

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"]["code"], "missing_credentials");
    }

    #[tokio::test]
    async fn undecodable_basic_header_is_forwarded_upstream() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET)
                    .path("/accounts")
                    .header("authorization", basic("Basic tok_abc"));
                then.status(401)
                    .body(r#"{"error":{"code":"invalid_credentials"}}"#);
            })
            .await;

        let request = Request::builder()
            .uri("/api/accounts")
            .header(AUTHORIZATION, "Basic tok_abc")
            .body(Body::empty())
            .unwrap();
        let response = app_for(&server.base_url()).oneshot(request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"]["code"], "invalid_credentials");
    }

    #[tokio::test]
    async fn token_less_request_is_rejected_locally_when_required() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/accounts");
                then.status(200).body("[]");
            })
            .await;

        let teller = TellerClient::new(None)
            .unwrap()
            .with_base_url(&server.base_url())
            .unwrap();
        let app = router(AppState::new(teller, true));

        let response = call(app, Method::GET, "/api/accounts", None, "").await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(mock.hits_async().await, 0);
    }
}
