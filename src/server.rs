use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::notify::{self, AdminNotifier};
use crate::registry::ClientRegistry;
use crate::session::{handle_connection, SessionContext};

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    run_with_registry(config, Arc::new(ClientRegistry::new())).await
}

/// Accept loop. The registry is taken as a parameter so the request
/// producer (the control-channel side of the deployment) can share it.
pub async fn run_with_registry(
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
) -> anyhow::Result<()> {
    config.validate()?;
    config.ensure_directories()?;

    let listener = bind_listener(&config.listen_address)?;
    info!("File server listening on {}", config.listen_address);

    let (notifier, events) = AdminNotifier::new();
    tokio::spawn(notify::log_events(events));

    let ctx = Arc::new(SessionContext::new(&config, registry, notifier));

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                info!("New file connection from {}", peer);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    // failures stay inside the connection task; the accept
                    // loop keeps running no matter how a session ends
                    if let Err(e) = handle_connection(socket, peer, ctx).await {
                        error!("Session error for {}: {:#}", peer, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

fn bind_listener(addr: &str) -> anyhow::Result<TcpListener> {
    let addr = addr
        .parse()
        .with_context(|| format!("invalid listen address {:?}", addr))?;
    let socket = match addr {
        std::net::SocketAddr::V4(_) => TcpSocket::new_v4()?,
        std::net::SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(1024)?)
}
