//! Courier — real-time message-routing server.
//!
//! Clients open persistent WebSocket connections, join named rooms, and
//! exchange broadcast or directed messages with the other members. Rooms
//! are implicit: created on first join, gone when the last member leaves.
//!
//! Usage:
//!   courier                          # Default port 6555
//!   courier --port 8080              # Custom port
//!   courier --cors                   # Allow cross-origin upgrades
//!   courier --no-chat-echo           # Don't echo chat back to the sender

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use courier_core::{RouterConfig, RoutingCore};
use courier_transport::{SenderTable, TransportConfig, TransportServer};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "courier", about = "Courier — real-time room message routing")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "6555")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "256")]
    max_connections: usize,

    /// Allow cross-origin WebSocket upgrades
    #[arg(long)]
    cors: bool,

    /// Interval between heartbeat pings, in milliseconds
    #[arg(long, default_value = "10000")]
    ping_interval_ms: u64,

    /// Grace period after a ping before a silent peer counts as gone,
    /// in milliseconds
    #[arg(long, default_value = "5000")]
    ping_timeout_ms: u64,

    /// Don't echo room chat back to its sender
    #[arg(long)]
    no_chat_echo: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(ref log_path) = cli.log_file {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
        {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // The sender table is both the transport's queue registry and the
    // core's delivery seam.
    let senders = SenderTable::new();
    let core = Arc::new(RoutingCore::new(
        Arc::new(senders.clone()),
        RouterConfig {
            echo_chat_to_sender: !cli.no_chat_echo,
        },
    ));

    let config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        enable_cors: cli.cors,
        max_connections: Some(cli.max_connections),
        ping_interval: Duration::from_millis(cli.ping_interval_ms),
        ping_timeout: Duration::from_millis(cli.ping_timeout_ms),
        verbose_logging: cli.verbose,
    };

    let mut transport = match TransportServer::start(config, core, senders).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("  Courier running!");
    println!();
    println!("  WebSocket endpoint:");
    println!("    ws://{}:{}/ws", cli.hostname, transport.port());
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    let _ = tokio::signal::ctrl_c().await;

    println!();
    println!("  Shutting down...");
    transport.stop().await;
    println!("  Server stopped.");
}
