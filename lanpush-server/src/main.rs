//! lanpush server — entry point.
//!
//! ```text
//! lanpush-server                   Run in the foreground
//! lanpush-server --config <path>   Load a custom config TOML
//! lanpush-server --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lanpush_server::config::ServerConfig;
use lanpush_server::server::PushServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lanpush-server", about = "lanpush local-network messaging server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lanpush-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ServerConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lanpush-server v{}", env!("CARGO_PKG_VERSION"));
    info!("control port: {}", config.network.control_port);
    info!("notification port: {}", config.network.notification_port);
    info!(
        "heartbeat: every {}s, {}s deadline",
        config.heartbeat.interval_secs, config.heartbeat.timeout_secs
    );

    let server = PushServer::new(&config);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received — shutting down");
    server.stop();

    Ok(())
}
