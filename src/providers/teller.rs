// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Teller API client with mutual-TLS client authentication.
//!
//! One base [`TellerClient`] is built at startup from the operator's
//! certificate and key. Each inbound request derives its own client through
//! [`TellerClient::bind`], which attaches that caller's access token. The
//! underlying connection pool is shared between bindings, the token is not.

use std::{fmt, fs};

use bytes::Bytes;
use reqwest::{Client, Identity, Method};
use serde_json::Value;
use url::Url;

use crate::config::Credential;

pub const TELLER_API_BASE_URL: &str = "https://api.teller.io";

/// Raw upstream result: status code plus the body bytes, if there were any.
///
/// The payload is deliberately left undecoded so unknown fields survive the
/// relay untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Option<Bytes>,
}

#[derive(Debug, thiserror::Error)]
pub enum TellerError {
    #[error("Teller client credential could not be loaded: {0}")]
    Credential(String),

    #[error("Teller client could not be built: {0}")]
    Client(String),

    #[error("Teller base URL is invalid: {0}")]
    BaseUrl(String),

    #[error("Teller request failed: {0}")]
    Request(String),
}

#[derive(Clone)]
pub struct TellerClient {
    base_url: Url,
    http: Client,
    access_token: Option<String>,
}

impl fmt::Debug for TellerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TellerClient")
            .field("base_url", &self.base_url.as_str())
            .field("has_access_token", &self.access_token.is_some())
            .finish()
    }
}

impl TellerClient {
    /// Build the process-wide base client.
    ///
    /// With a credential, the certificate and key are loaded once and used as
    /// the TLS client identity for every request from this client and all of
    /// its bindings.
    pub fn new(credential: Option<&Credential>) -> Result<Self, TellerError> {
        let mut builder = Client::builder().use_rustls_tls();
        if let Some(credential) = credential {
            builder = builder.identity(load_identity(credential)?);
        }
        let http = builder
            .build()
            .map_err(|e| TellerError::Client(e.to_string()))?;

        let base_url =
            Url::parse(TELLER_API_BASE_URL).map_err(|e| TellerError::BaseUrl(e.to_string()))?;

        Ok(Self {
            base_url,
            http,
            access_token: None,
        })
    }

    /// Point the client at another host. Used to target mock servers.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, TellerError> {
        let url = Url::parse(base_url).map_err(|e| TellerError::BaseUrl(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(TellerError::BaseUrl(base_url.to_string()));
        }
        self.base_url = url;
        Ok(self)
    }

    /// Derive a client for one caller.
    ///
    /// The returned value carries `access_token` and nothing else changes; the
    /// receiver is left as it was, so bindings never observe each other.
    pub fn bind(&self, access_token: Option<&str>) -> Self {
        Self {
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            access_token: access_token.map(str::to_string),
        }
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub async fn list_accounts(&self) -> Result<UpstreamResponse, TellerError> {
        self.send(Method::GET, &["accounts"], None).await
    }

    pub async fn get_account_details(
        &self,
        account_id: &str,
    ) -> Result<UpstreamResponse, TellerError> {
        self.send(Method::GET, &["accounts", account_id, "details"], None)
            .await
    }

    pub async fn get_account_balances(
        &self,
        account_id: &str,
    ) -> Result<UpstreamResponse, TellerError> {
        self.send(Method::GET, &["accounts", account_id, "balances"], None)
            .await
    }

    pub async fn list_account_transactions(
        &self,
        account_id: &str,
    ) -> Result<UpstreamResponse, TellerError> {
        self.send(Method::GET, &["accounts", account_id, "transactions"], None)
            .await
    }

    pub async fn list_account_payees(
        &self,
        account_id: &str,
        scheme: &str,
    ) -> Result<UpstreamResponse, TellerError> {
        self.send(
            Method::GET,
            &["accounts", account_id, "payments", scheme, "payees"],
            None,
        )
        .await
    }

    pub async fn create_account_payee(
        &self,
        account_id: &str,
        scheme: &str,
        body: Option<&Value>,
    ) -> Result<UpstreamResponse, TellerError> {
        self.send(
            Method::POST,
            &["accounts", account_id, "payments", scheme, "payees"],
            body,
        )
        .await
    }

    pub async fn create_account_payment(
        &self,
        account_id: &str,
        scheme: &str,
        body: Option<&Value>,
    ) -> Result<UpstreamResponse, TellerError> {
        self.send(
            Method::POST,
            &["accounts", account_id, "payments", scheme],
            body,
        )
        .await
    }

    /// Build the upstream URL, encoding each caller-supplied value as exactly
    /// one path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, TellerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TellerError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<UpstreamResponse, TellerError> {
        let url = self.url(segments)?;
        let path = url.path().to_string();

        let mut request = self.http.request(method.clone(), url);
        if let Some(token) = &self.access_token {
            request = request.basic_auth(token, Some(""));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TellerError::Request(format!("{method} {path} failed: {e}")))?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            TellerError::Request(format!("{method} {path} body could not be read: {e}"))
        })?;

        Ok(UpstreamResponse {
            status,
            body: (!bytes.is_empty()).then_some(bytes),
        })
    }
}

/// rustls wants the certificate chain and the private key in one PEM buffer.
fn load_identity(credential: &Credential) -> Result<Identity, TellerError> {
    let mut pem = fs::read(&credential.cert_path).map_err(|e| {
        TellerError::Credential(format!(
            "failed to read {}: {e}",
            credential.cert_path.display()
        ))
    })?;
    let key = fs::read(&credential.key_path).map_err(|e| {
        TellerError::Credential(format!(
            "failed to read {}: {e}",
            credential.key_path.display()
        ))
    })?;

    pem.push(b'\n');
    pem.extend_from_slice(&key);

    Identity::from_pem(&pem).map_err(|e| TellerError::Credential(e.to_string()))
}
