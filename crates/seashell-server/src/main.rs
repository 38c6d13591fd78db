//! seashell-server: bridges browser terminals to remote SSH shells.
//!
//! Accepts WebSocket connections, authenticates them via bearer token,
//! resolves the requested connection profile, and runs one terminal
//! session bridge per connection.

mod auth;
mod bridge;
mod config;
mod profiles;
mod server;
mod transport;

use clap::Parser;
use config::ServerConfig;
use seashell_core::UserId;
use server::TerminalServer;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// seashell-server — browser-to-SSH terminal bridge
#[derive(Parser, Debug)]
#[command(name = "seashell-server", version, about = "Browser-to-SSH terminal bridge")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.seashell/config.toml")]
    config: String,

    /// Mint a bearer token for the given user id and exit
    #[arg(long, value_name = "USER_ID")]
    mint_token: Option<u64>,

    /// Lifetime of a minted token in seconds
    #[arg(long, default_value_t = 3600)]
    token_ttl: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        cli.port,
        cli.bind.as_deref(),
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    // Token minting utility mode: print the token and exit.
    if let Some(user_id) = cli.mint_token {
        match auth::load_or_create_secret(&server_config.secret_path) {
            Ok(secret) => {
                let verifier = auth::HmacTokenVerifier::new(&secret);
                println!("{}", verifier.mint(UserId(user_id), cli.token_ttl));
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to load token secret");
                std::process::exit(1);
            }
        }
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %server_config.bind,
        port = server_config.port,
        connections = server_config.connections.len(),
        "starting seashell-server"
    );

    if server_config.accept_any_host_key {
        warn!("accept_any_host_key is enabled — remote host identity will NOT be verified; use only for development");
    } else if server_config.host_key_fingerprints.is_empty() {
        warn!("no host key fingerprints configured — all SSH connections will be rejected");
    }

    let terminal_server = match TerminalServer::new(server_config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create server");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = terminal_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("seashell-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
