// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Caller Access Tokens
//!
//! The proxy does not authenticate callers itself. It lifts the Teller access
//! token out of the inbound `Authorization` header and hands it to the
//! upstream client, which forwards it as the basic-auth username.
//!
//! ## Accepted header forms
//!
//! - `Authorization: <token>` (what Teller Connect front-ends send)
//! - `Authorization: Bearer <token>`
//! - `Authorization: Basic base64(<token>:)`
//!
//! Nothing is validated here. A `Basic` payload that does not decode is
//! forwarded as a raw token and Teller answers for it.
//!
//! A missing header is forwarded as "no token" unless the server was started
//! with `REQUIRE_ACCESS_TOKEN=true`, in which case it is rejected with 401.

pub mod error;
pub mod extractor;

pub use error::AuthError;
pub use extractor::{parse_access_token, AccessToken};
