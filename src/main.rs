// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use teller_proxy::{
    config::{
        env_optional, CredentialSources, Environment, ServerConfig, DEFAULT_LEDGER_PATH,
        DEFAULT_LOG_FILTER, LEDGER_PATH_ENV, LOG_FORMAT_ENV, TELLER_ACCESS_TOKEN_ENV,
        TELLER_ENVIRONMENT_ENV,
    },
    providers::TellerClient,
    server,
    storage::LedgerDatabase,
    sync::sync_ledger,
};

#[derive(Parser)]
#[command(name = "teller-proxy", version, about = "HTTP proxy in front of the Teller API")]
struct Cli {
    /// Teller environment the certificate was issued for.
    #[arg(
        long,
        global = true,
        env = TELLER_ENVIRONMENT_ENV,
        value_enum,
        default_value = "sandbox"
    )]
    environment: Environment,

    /// Deprecated: use TELLER_CERT_PATH.
    #[arg(long, global = true)]
    cert: Option<PathBuf>,

    /// Deprecated: use TELLER_KEY_PATH.
    #[arg(long = "cert-key", global = true)]
    cert_key: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the proxy (default).
    Serve,

    /// Pull accounts, balances and transactions into the local ledger.
    Sync {
        /// Access token whose enrollment is synced.
        #[arg(long, env = TELLER_ACCESS_TOKEN_ENV, hide_env_values = true)]
        access_token: String,

        /// Ledger database file.
        #[arg(long, env = LEDGER_PATH_ENV, default_value = DEFAULT_LEDGER_PATH)]
        ledger: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    // Must happen before any TLS client or server config is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        error!("Failed to install rustls crypto provider");
        return ExitCode::FAILURE;
    }

    let sources = CredentialSources::from_env(cli.cert, cli.cert_key);
    if sources.uses_deprecated_flags() {
        warn!("--cert/--cert-key are deprecated; set TELLER_CERT_PATH and TELLER_KEY_PATH instead");
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.environment, &sources).await,
        Command::Sync {
            access_token,
            ledger,
        } => sync(cli.environment, &sources, &access_token, ledger).await,
    }
}

async fn serve(environment: Environment, sources: &CredentialSources) -> ExitCode {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid server configuration");
            return ExitCode::FAILURE;
        }
    };

    match server::run(environment, sources, config, shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Teller proxy failed to start or stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn sync(
    environment: Environment,
    sources: &CredentialSources,
    access_token: &str,
    ledger_path: PathBuf,
) -> ExitCode {
    let teller: TellerClient = match server::teller_client(environment, sources) {
        Ok(teller) => teller,
        Err(e) => {
            error!(error = %e, "Invalid Teller credential configuration");
            return ExitCode::FAILURE;
        }
    };

    let ledger = match LedgerDatabase::open(&ledger_path) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!(error = %e, path = %ledger_path.display(), "Failed to open ledger");
            return ExitCode::FAILURE;
        }
    };

    let client = teller.bind(Some(access_token));
    match sync_ledger(&client, &ledger).await {
        Ok(summary) => {
            info!(
                path = %ledger_path.display(),
                accounts = summary.accounts,
                transactions_inserted = summary.transactions_inserted,
                "Sync finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Sync failed");
            ExitCode::FAILURE
        }
    }
}

/// `LOG_FORMAT=json` for structured output, human-readable otherwise.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = env_optional(LOG_FORMAT_ENV).is_some_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }
}
