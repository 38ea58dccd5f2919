// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the startup checks that decide
//! whether the proxy may run at all. Everything here is resolved once before
//! the listener is bound; nothing in this module is consulted per request.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `TELLER_ENVIRONMENT` | `sandbox`, `development` or `production` | `sandbox` |
//! | `TELLER_CERT_PATH` | Teller client certificate (PEM) | Required outside sandbox |
//! | `TELLER_KEY_PATH` | Teller client private key (PEM) | Required outside sandbox |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8001` |
//! | `TLS_CERT_PATH` | Inbound HTTPS certificate (PEM) | Optional |
//! | `TLS_KEY_PATH` | Inbound HTTPS private key (PEM) | Optional |
//! | `REQUIRE_ACCESS_TOKEN` | Reject requests without a token locally | `false` |
//! | `LEDGER_PATH` | Ledger database used by `sync` | `teller-ledger.redb` |
//! | `TELLER_ACCESS_TOKEN` | Access token used by `sync` | Required for `sync` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! The `--cert` / `--cert-key` flags are still accepted but deprecated; the
//! environment variables take precedence when both are given.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

use clap::ValueEnum;

pub const TELLER_ENVIRONMENT_ENV: &str = "TELLER_ENVIRONMENT";
pub const TELLER_CERT_PATH_ENV: &str = "TELLER_CERT_PATH";
pub const TELLER_KEY_PATH_ENV: &str = "TELLER_KEY_PATH";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const REQUIRE_ACCESS_TOKEN_ENV: &str = "REQUIRE_ACCESS_TOKEN";
pub const LEDGER_PATH_ENV: &str = "LEDGER_PATH";
pub const TELLER_ACCESS_TOKEN_ENV: &str = "TELLER_ACCESS_TOKEN";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_LEDGER_PATH: &str = "teller-ledger.redb";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Teller API environment the proxy is operated against.
///
/// Only affects whether a client certificate is mandatory; the upstream base
/// URL is the same for all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Sandbox,
    Development,
    Production,
}

impl Environment {
    /// Development and production enrollments only accept mTLS callers.
    pub fn requires_certificate(self) -> bool {
        matches!(self, Environment::Development | Environment::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutual-TLS client identity presented to Teller: certificate + private key.
///
/// Either both paths exist or there is no `Credential` at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Raw certificate/key locations before precedence and validation.
#[derive(Debug, Clone, Default)]
pub struct CredentialSources {
    pub env_cert: Option<PathBuf>,
    pub env_key: Option<PathBuf>,
    pub flag_cert: Option<PathBuf>,
    pub flag_key: Option<PathBuf>,
}

impl CredentialSources {
    /// Read `TELLER_CERT_PATH` / `TELLER_KEY_PATH` from the process
    /// environment and pair them with the (deprecated) flag values.
    pub fn from_env(flag_cert: Option<PathBuf>, flag_key: Option<PathBuf>) -> Self {
        Self::from_lookup(env_optional, flag_cert, flag_key)
    }

    pub fn from_lookup<F>(lookup: F, flag_cert: Option<PathBuf>, flag_key: Option<PathBuf>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            env_cert: lookup(TELLER_CERT_PATH_ENV).map(PathBuf::from),
            env_key: lookup(TELLER_KEY_PATH_ENV).map(PathBuf::from),
            flag_cert,
            flag_key,
        }
    }

    /// True when a deprecated flag ends up supplying a path.
    pub fn uses_deprecated_flags(&self) -> bool {
        (self.env_cert.is_none() && self.flag_cert.is_some())
            || (self.env_key.is_none() && self.flag_key.is_some())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TELLER_CERT_PATH and TELLER_KEY_PATH must be set for {0} environments")]
    MissingCredential(Environment),

    #[error("{present} is set but {missing} is not; both must be configured together")]
    IncompletePair {
        present: &'static str,
        missing: &'static str,
    },

    #[error("Certificate file not found: {}", .0.display())]
    CertificateNotFound(PathBuf),

    #[error("Private key file not found: {}", .0.display())]
    KeyNotFound(PathBuf),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Apply precedence (environment over flag) and the per-environment
/// certificate policy.
///
/// Returns `Ok(None)` when no client certificate is configured, which is only
/// permitted for [`Environment::Sandbox`].
pub fn resolve_credential(
    environment: Environment,
    sources: &CredentialSources,
) -> Result<Option<Credential>, ConfigError> {
    let cert = sources.env_cert.clone().or_else(|| sources.flag_cert.clone());
    let key = sources.env_key.clone().or_else(|| sources.flag_key.clone());

    let credential = match (cert, key) {
        (Some(cert_path), Some(key_path)) => Credential { cert_path, key_path },
        (None, None) if environment.requires_certificate() => {
            return Err(ConfigError::MissingCredential(environment));
        }
        (None, None) => return Ok(None),
        (Some(_), None) => {
            return Err(ConfigError::IncompletePair {
                present: TELLER_CERT_PATH_ENV,
                missing: TELLER_KEY_PATH_ENV,
            });
        }
        (None, Some(_)) => {
            return Err(ConfigError::IncompletePair {
                present: TELLER_KEY_PATH_ENV,
                missing: TELLER_CERT_PATH_ENV,
            });
        }
    };

    ensure_file(&credential.cert_path, ConfigError::CertificateNotFound)?;
    ensure_file(&credential.key_path, ConfigError::KeyNotFound)?;

    Ok(Some(credential))
}

/// Certificate/key for terminating inbound HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTls {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Listener settings and request-handling policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub tls: Option<ServerTls>,
    /// When false, token-less requests are forwarded and Teller rejects them.
    pub require_access_token: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_optional)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let ip: IpAddr = host.parse().map_err(|_| ConfigError::InvalidValue {
            name: HOST_ENV,
            value: host.clone(),
        })?;

        let port = match lookup(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: PORT_ENV,
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let tls = match (lookup(TLS_CERT_PATH_ENV), lookup(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => {
                let tls = ServerTls {
                    cert_path: PathBuf::from(cert),
                    key_path: PathBuf::from(key),
                };
                ensure_file(&tls.cert_path, ConfigError::CertificateNotFound)?;
                ensure_file(&tls.key_path, ConfigError::KeyNotFound)?;
                Some(tls)
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::IncompletePair {
                    present: TLS_CERT_PATH_ENV,
                    missing: TLS_KEY_PATH_ENV,
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompletePair {
                    present: TLS_KEY_PATH_ENV,
                    missing: TLS_CERT_PATH_ENV,
                });
            }
        };

        let require_access_token = match lookup(REQUIRE_ACCESS_TOKEN_ENV) {
            Some(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidValue {
                name: REQUIRE_ACCESS_TOKEN_ENV,
                value: raw,
            })?,
            None => false,
        };

        Ok(Self {
            addr: SocketAddr::new(ip, port),
            tls,
            require_access_token,
        })
    }
}

fn ensure_file(path: &Path, err: fn(PathBuf) -> ConfigError) -> Result<(), ConfigError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(err(path.to_path_buf()))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read an environment variable, treating blank values as unset.
pub fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
