//! LightSword Local - SOCKS5 proxy in front of a LightSword relay
//!
//! Usage:
//!   lightsword-local --server relay.example.net --server-port 8900 --password secret
//!
//! Then point your browser/system at the SOCKS5 proxy on 127.0.0.1:1080

use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lightsword_client::cli::Args;
use lightsword_client::{RawConfig, ServerConfig, Socks5Server};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let file = match &args.config {
        Some(path) => RawConfig::load(path)?,
        None => RawConfig::default(),
    };
    let config = ServerConfig::try_from(file.merge(args.overrides())).map_err(|e| {
        error!("❌ {}", e);
        e
    })?;

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║         LightSword Local                                     ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Relay:  {}:{} ({})", config.server_addr, config.server_port, config.cipher);
    info!("║  SOCKS5: {}:{}", config.listen_addr, config.listen_port);
    info!("║  Mode:   {:?}", config.proxy_mode);
    info!("╚══════════════════════════════════════════════════════════════╝");

    let server = Socks5Server::new(config)?;
    let addr = server.start().await.map_err(|e| {
        error!("❌ Failed to start: {}", e);
        e
    })?;
    info!("   Configure your browser to use SOCKS5 proxy: {}", addr);

    let server = std::sync::Arc::new(server);
    if args.stats_interval > 0 {
        let server = server.clone();
        let period = Duration::from_secs(args.stats_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            while server.is_running() {
                ticker.tick().await;
                let stats = server.stats();
                info!(
                    "📊 sent {} bytes, received {} bytes",
                    stats.sent_bytes, stats.received_bytes
                );
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    server.stop().await;

    let stats = server.stats();
    info!(
        "Total: sent {} bytes, received {} bytes",
        stats.sent_bytes, stats.received_bytes
    );
    Ok(())
}
