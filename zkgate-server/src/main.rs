//! zkgate server binary.
//!
//! Speaks the ZooKeeper client protocol on `--bind-addr` and bridges
//! every operation to the KV store named by `--backend-url`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::net::SocketAddr;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use zkgate_server::{Server, ServerConfig};

/// ZooKeeper-to-KV protocol bridge.
#[derive(Parser, Debug)]
#[command(name = "zkgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the ZooKeeper listener to.
    #[arg(long, default_value = "0.0.0.0:2181")]
    bind_addr: SocketAddr,

    /// Backend to bridge to (etcd://host:port or consul://host:port).
    #[arg(long, default_value = "etcd://127.0.0.1:4001")]
    backend_url: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        bind_addr = %args.bind_addr,
        backend_url = %args.backend_url,
        "starting zkgate"
    );

    let client = zkgate_backend::new_client(&args.backend_url)?;
    let server = Server::bind(ServerConfig::new(args.bind_addr), client)?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("signal received, shutting down");
        shutdown.shutdown();
    });

    server.run().await?;
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let Ok(mut terminate) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
