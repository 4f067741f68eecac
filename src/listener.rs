//! Server listener
//!
//! Accepts connections, spawns one session per connection, and coordinates
//! graceful shutdown: stop accepting, let open sessions finish the command
//! they are on, then wait for them up to the drain timeout.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::server::ChatServer;

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Bind the configured address and serve until a termination signal
pub async fn run(config: ServerConfig) -> Result<(), AppError> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    info!("Chat server listening on {}", addr);

    serve(listener, &config, shutdown_signal()).await
}

/// Serve connections from `listener` until `shutdown` completes
pub async fn serve<F>(listener: TcpListener, config: &ServerConfig, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()>,
{
    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let server_task = tokio::spawn(ChatServer::new(cmd_rx).run());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let permits = Arc::new(Semaphore::new(config.max_connections));
    let mut sessions = JoinSet::new();

    tokio::pin!(shutdown);

    // Connection accept loop
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down, no longer accepting connections");
                break;
            }
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    error!("Session task failed: {}", e);
                }
            }
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                    warn!(
                        "Connection limit ({}) reached, rejecting {}",
                        config.max_connections, addr
                    );
                    continue;
                };

                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();
                let shutdown_rx = shutdown_tx.subscribe();
                let client_buffer = config.client_buffer;

                // Spawn handler task for each connection
                sessions.spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handle_connection(stream, cmd_tx, shutdown_rx, client_buffer).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
        }
    }

    // Close the listening socket before draining
    drop(listener);
    let _ = shutdown_tx.send(());

    let open = sessions.len();
    if open > 0 {
        info!("Waiting for {} open session(s)", open);
    }
    let drained = tokio::time::timeout(config.drain_timeout(), async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "Drain timeout elapsed, aborting {} session(s)",
            sessions.len()
        );
        sessions.shutdown().await;
    }

    // All handler senders are gone once this one drops; the actor then exits
    drop(cmd_tx);
    if let Err(e) = server_task.await {
        error!("ChatServer task failed: {}", e);
    }

    debug!("Listener stopped");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
