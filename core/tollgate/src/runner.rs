// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Server lifecycle: socket bind, identity bootstrap, graceful shutdown.
//!
//! Startup ordering matters here. The gRPC socket is bound before the
//! identity bootstrap starts so the proxy can connect immediately; the
//! decision server answers 503 with Retry-After until the Workload API
//! becomes reachable and the identity source is injected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use envoy_types::ext_authz::v3::pb::AuthorizationServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tollgate_auth::server::{DecisionServer, ServerConfig};
use tollgate_auth::spiffe::SpiffeIdentitySource;
use tollgate_config::TollgateConfig;

const BOOTSTRAP_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);
const BOOTSTRAP_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Run the sidecar until a shutdown signal arrives, then stop gracefully
/// within the configured drain timeout (forced stop afterwards).
pub async fn run(config: TollgateConfig) -> Result<()> {
    let addr: SocketAddr = config.listen.parse().context("invalid listen endpoint")?;

    let server = DecisionServer::new(ServerConfig::from_config(&config))
        .context("failed to initialize decision server")?;

    // Bind before anything else so the proxy never sees a connection refused
    // during identity bootstrap.
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, mode = %server.mode(), "ext_authz server listening");

    let cancel = CancellationToken::new();
    if server.needs_identity_source() {
        tokio::spawn(bootstrap_identity_source(
            server.clone(),
            config.workload_socket.clone(),
            cancel.clone(),
        ));
    } else {
        info!(mode = %server.mode(), "identity source not required");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut grpc_task = tokio::spawn(
        tonic::transport::Server::builder()
            .max_concurrent_streams(config.max_concurrent_streams)
            .add_service(AuthorizationServer::new(server))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                let _ = shutdown_rx.await;
            }),
    );

    tokio::select! {
        result = &mut grpc_task => {
            cancel.cancel();
            result.context("grpc server task failed")?.context("grpc serve error")?;
            return Ok(());
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    cancel.cancel();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(config.drain_timeout(), &mut grpc_task).await {
        Ok(result) => {
            result.context("grpc server task failed")?.context("grpc serve error")?;
            info!("grpc server stopped gracefully");
        }
        Err(_) => {
            warn!(timeout = ?config.drain_timeout(), "graceful stop timed out; forcing stop");
            grpc_task.abort();
        }
    }

    Ok(())
}

/// Retry the Workload API connection until it succeeds, then install the
/// identity source on the decision server. Exchange requests keep failing
/// with a transient 503 in the meantime. Exchange and delegation calls are
/// never retried; this bootstrap loop is the only retry in the system.
async fn bootstrap_identity_source(
    server: DecisionServer,
    workload_socket: String,
    cancel: CancellationToken,
) {
    loop {
        info!(socket = %workload_socket, "initializing identity source");

        let attempt = tokio::time::timeout(
            BOOTSTRAP_ATTEMPT_TIMEOUT,
            SpiffeIdentitySource::connect(Some(&workload_socket)),
        );

        tokio::select! {
            result = attempt => match result {
                Ok(Ok(source)) => {
                    server.set_identity_source(Arc::new(source));
                    info!("identity source ready");
                    return;
                }
                Ok(Err(err)) => {
                    warn!(error = %err, retry_in = ?BOOTSTRAP_RETRY_DELAY, "identity source init failed");
                }
                Err(_) => {
                    warn!(
                        timeout = ?BOOTSTRAP_ATTEMPT_TIMEOUT,
                        retry_in = ?BOOTSTRAP_RETRY_DELAY,
                        "identity source init timed out"
                    );
                }
            },
            _ = cancel.cancelled() => return,
        }

        tokio::select! {
            _ = tokio::time::sleep(BOOTSTRAP_RETRY_DELAY) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
