// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Process Startup
//!
//! Startup is split in two: [`prepare`] resolves every piece of configuration
//! and builds the Teller client without touching the network, then [`serve`]
//! binds the listener. [`run`] chains them, so a configuration error always
//! surfaces before any socket is opened.

use std::{future::Future, io, net::SocketAddr, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio::sync::oneshot;
use tracing::info;

use crate::{
    api::router,
    config::{resolve_credential, ConfigError, CredentialSources, Environment, ServerConfig},
    providers::{TellerClient, TellerError},
    state::AppState,
};

/// Grace period for in-flight requests after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Teller(#[from] TellerError),

    #[error("failed to load inbound TLS certificate: {0}")]
    Tls(#[source] io::Error),

    #[error("server failed: {0}")]
    Serve(#[source] io::Error),
}

/// Everything the listener needs, resolved up front.
#[derive(Debug)]
pub struct Launch {
    pub teller: TellerClient,
    pub server: ServerConfig,
}

/// Apply the certificate policy for `environment` and build the base client.
pub fn teller_client(
    environment: Environment,
    sources: &CredentialSources,
) -> Result<TellerClient, StartupError> {
    let credential = resolve_credential(environment, sources)?;
    let teller = TellerClient::new(credential.as_ref())?;

    info!(
        environment = %environment,
        mtls = credential.is_some(),
        "Teller client ready"
    );
    Ok(teller)
}

pub fn prepare(
    environment: Environment,
    sources: &CredentialSources,
    server: ServerConfig,
) -> Result<Launch, StartupError> {
    let teller = teller_client(environment, sources)?;
    Ok(Launch { teller, server })
}

/// Bind and serve until `shutdown` resolves.
///
/// When `listening` is given it receives the bound address once the socket
/// is open.
pub async fn serve<F>(
    launch: Launch,
    shutdown: F,
    listening: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let Launch { teller, server } = launch;
    let app = router(AppState::new(teller, server.require_access_token));

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.await;
            info!("Shutdown signal received, draining connections");
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    if let Some(tx) = listening {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Some(addr) = handle.listening().await {
                let _ = tx.send(addr);
            }
        });
    }

    let result = match &server.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(StartupError::Tls)?;
            info!(
                addr = %server.addr,
                require_access_token = server.require_access_token,
                "Teller proxy listening on https://{}",
                server.addr
            );
            axum_server::bind_rustls(server.addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!(
                addr = %server.addr,
                require_access_token = server.require_access_token,
                "Teller proxy listening on http://{}",
                server.addr
            );
            axum_server::bind(server.addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };
    result.map_err(StartupError::Serve)
}

/// [`prepare`] then [`serve`].
pub async fn run<F>(
    environment: Environment,
    sources: &CredentialSources,
    server: ServerConfig,
    shutdown: F,
) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let launch = prepare(environment, sources, server)?;
    serve(launch, shutdown, None).await
}
