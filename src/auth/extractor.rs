// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the caller's Teller access token.
//!
//! ```rust,ignore
//! async fn my_handler(AccessToken(token): AccessToken) -> impl IntoResponse {
//!     // token is Option<String>
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use base64ct::{Base64, Encoding};

use super::AuthError;
use crate::state::AppState;

/// The access token the caller presented, if any.
pub struct AccessToken(pub Option<String>);

impl FromRequestParts<AppState> for AccessToken {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Teller decides whether a credential is acceptable, so nothing the
        // caller sent is rejected here.
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| parse_access_token(&String::from_utf8_lossy(value.as_bytes())));

        if token.is_none() && state.require_access_token {
            return Err(AuthError::MissingAccessToken);
        }

        Ok(AccessToken(token))
    }
}

/// Pull the token out of an `Authorization` header value.
///
/// `Bearer` and `Basic` schemes are unwrapped; anything else is taken as the
/// raw token, as is a `Basic` payload that does not decode. A blank result is
/// `None`.
pub fn parse_access_token(header: &str) -> Option<String> {
    let header = header.trim();

    let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));

    let token = if scheme.eq_ignore_ascii_case("bearer") {
        rest.trim().to_string()
    } else if scheme.eq_ignore_ascii_case("basic") {
        match decode_basic(rest.trim()) {
            // Token is the username; Teller leaves the password empty.
            Some(credentials) => match credentials.split_once(':') {
                Some((username, _)) => username.to_string(),
                None => credentials,
            },
            None => header.to_string(),
        }
    } else {
        header.to_string()
    };

    (!token.is_empty()).then_some(token)
}

fn decode_basic(payload: &str) -> Option<String> {
    let decoded = Base64::decode_vec(payload).ok()?;
    String::from_utf8(decoded).ok()
}
