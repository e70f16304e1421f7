#![forbid(unsafe_code)]

use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use smb_engine::cli::Cli;
use smb_engine::config;
use smb_engine::server::{self, ServerState};
use smb_engine::vfs::LocalFs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config_path();
    info!("Loading configuration from {}", config_path.display());

    let config = config::load_config(&config_path)?;

    for share in &config.shares {
        if !share.path.exists() {
            warn!(
                "Share '{}' path does not exist: {}",
                share.name,
                share.path.display()
            );
        }
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("SMB server listening on {}", addr);
    info!(
        "Shares: {}",
        config
            .shares
            .iter()
            .map(|s| format!("{}={}{}", s.name, s.path.display(), if s.read_only { " (ro)" } else { "" }))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let server_state = Arc::new(ServerState::from_config(config, LocalFs::new()));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        info!("Connection from {}", peer);
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }
                        let state = server_state.clone();
                        let mut stop = stop_rx.clone();
                        let stopped = async move {
                            let signalled = stop.wait_for(|s| *s).await.is_ok();
                            // The sender outlives every connection, so this only guards a bare drop.
                            if !signalled {
                                std::future::pending::<()>().await;
                            }
                        };
                        let _ = connections.spawn(async move {
                            if let Err(e) = server::handle_connection(stream, state, stopped).await {
                                error!("Connection from {} error: {}", peer, e);
                            }
                            info!("Connection from {} closed", peer);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {:?}", e);
                    }
                }
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    error!("Connection task failed: {}", e);
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    drop(listener);
    let _ = stop_tx.send_replace(true);
    info!("Waiting for {} connection(s) to close", connections.len());
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            error!("Connection task failed: {}", e);
        }
    }

    Ok(())
}
