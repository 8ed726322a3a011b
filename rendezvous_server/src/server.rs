//! Listener and server lifecycle

use crate::config::RelayConfig;
use crate::error::SignalingError;
use crate::handler::handle_connection;
use crate::liveness;
use crate::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Back-off after a failed accept, so fd exhaustion does not spin the loop
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Stops a running [`RelayServer`]; cheap to clone
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Stop accepting and end the liveness monitor
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

/// A bound relay, ready to serve
pub struct RelayServer {
    listener: TcpListener,
    state: ServerState,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RelayServer {
    /// Bind the listener named in `config`
    pub async fn bind(config: RelayConfig) -> Result<Self, SignalingError> {
        let listener = TcpListener::bind(config.addr()).await?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            listener,
            state: ServerState::new(config),
            shutdown: Arc::new(shutdown),
        })
    }

    /// The address actually bound; differs from the config when port 0 was asked for
    pub fn local_addr(&self) -> Result<SocketAddr, SignalingError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> ServerState {
        self.state.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Accept connections and run the liveness monitor until shut down
    pub async fn serve(self) -> Result<(), SignalingError> {
        let mut shutdown = self.shutdown.subscribe();
        let monitor = tokio::spawn(liveness::run(self.state.clone(), self.shutdown.subscribe()));

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let state = self.state.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state).await {
                                warn!(%addr, "connection failed: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        error!("accept failed: {e}");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        info!("shutting down");
        let _ = monitor.await;
        Ok(())
    }
}

/// Bind, serve, and stop on Ctrl-C
pub async fn run(config: RelayConfig) -> Result<(), SignalingError> {
    let server = RelayServer::bind(config).await?;
    info!("rendezvous relay listening on {}", server.local_addr()?);

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => handle.shutdown(),
            Err(e) => error!("unable to listen for shutdown signal: {e}"),
        }
    });

    server.serve().await
}
