// ============================================
// File: crates/nnvpn-daemon/src/main.rs
// ============================================
//! # nnvpn Entry Point
//!
//! ## Creation Reason
//! Binary entry point: CLI parsing, logging setup, role dispatch.
//!
//! ## Usage
//! ```bash
//! # Listener side
//! nnvpn -s -f /etc/nnvpn/nnvpn.toml
//!
//! # Dialer side
//! nnvpn -f /etc/nnvpn/nnvpn.toml -d 2
//! ```
//!
//! ## Exit Codes
//! - 0: clean exit (never reached while a session is healthy)
//! - 1: configuration, credential or logging setup error
//! - 2: missing privileges for interface configuration
//! - 3: data-plane or TLS error
//!
//! ## ⚠️ Important Note for Next Developer
//! - Logging must be initialized after the configuration is loaded:
//!   the `log` key decides the writer
//! - Run under systemd (or equivalent) on the dialer side; a fault
//!   exits the process by design
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nnvpn_daemon::config::DEFAULT_CONFIG_PATH;
use nnvpn_daemon::{dialer, listener, Config, DaemonError, Result};

// ============================================
// CLI Definition
// ============================================

/// nnvpn - a minimal site-to-site VPN over mutually-authenticated TLS
#[derive(Parser, Debug)]
#[command(name = "nnvpn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'f', value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug verbosity: 0 errors only, 1 standard, 2 verbose
    #[arg(short = 'd', value_name = "LEVEL", default_value_t = 0)]
    debug: u8,

    /// Listener mode (dialer when absent)
    #[arg(short = 's')]
    server: bool,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.subsystem(), e);
        eprintln!("Error [{}]: {}", e.subsystem(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Config first: the `log` key decides where logging goes.
    let config = Config::load(&cli.config).await?;

    init_logging(cli.debug, config.log.as_deref())?;

    info!(
        "nnvpn v{} starting in {} mode",
        env!("CARGO_PKG_VERSION"),
        if cli.server { "listener" } else { "dialer" }
    );

    if cli.server {
        listener::run(&config).await
    } else {
        dialer::run(&config).await
    }
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
///
/// `-d` picks the default filter (overridable via `RUST_LOG`); the
/// `log` config key routes output to a file instead of stderr.
fn init_logging(debug_level: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match debug_level {
        0 => "error",
        1 => "info",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    DaemonError::log_init(format!("cannot open '{}': {}", path.display(), e))
                })?;

            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_ansi(false).with_writer(Arc::new(file)))
                .with(filter)
                .try_init()
        }
        None => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| DaemonError::log_init(e.to_string()))
}
