//! Blue/green failover reverse proxy.
//!
//! One listener, two named backends. Every request goes to the active
//! pool while it is healthy; on a timeout, connection error or 5xx the
//! proxy retries once against the backup inside the same client request.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                  FAILOVER PROXY                   │
//!                         │                                                   │
//!     Client Request      │  ┌─────────┐   ┌────────────┐   ┌─────────────┐  │
//!     ────────────────────┼─▶│  http   │──▶│  dispatch  │──▶│  registry   │  │
//!                         │  │ server  │   │ (1 retry)  │   │ blue/green  │  │
//!                         │  └─────────┘   └─────┬──────┘   └──────┬──────┘  │
//!                         │                      │                 │         │
//!                         │                      ▼                 ▼         │
//!     Client Response     │               ┌────────────┐   ┌─────────────┐   │
//!     ◀───────────────────┼───────────────│  attempt   │   │   health    │   │
//!                         │               │ (timeouts) │──▶│  tracker    │   │
//!                         │               └─────┬──────┘   └─────────────┘   │
//!                         │                     │                            │
//!                         │                     ▼                            │
//!                         │               ┌────────────┐                     │
//!                         │               │   alerts   │──▶ Slack webhook    │
//!                         │               │  monitor   │                     │
//!                         │               └────────────┘                     │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use bluegreen_proxy::config::load_config;
use bluegreen_proxy::lifecycle::{self, signals, Shutdown};
use bluegreen_proxy::observability::init_logging;

#[derive(Parser, Debug)]
#[command(name = "bluegreen-proxy", version, about = "Blue/green failover reverse proxy")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;

    if args.check {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        active_pool = %config.upstream.active_pool,
        backup_pool = config.backup_pool_name().unwrap_or("-"),
        max_fails = config.failover.max_fails,
        fail_timeout_secs = config.failover.fail_timeout_secs,
        connect_timeout_secs = config.timeouts.connect_secs,
        read_timeout_secs = config.timeouts.read_secs,
        alerts_enabled = config.alerts.enabled,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let signal_task = signals::trigger_on_termination(shutdown.clone());

    let result = lifecycle::start(config, &shutdown).await;
    signal_task.abort();
    result?;

    tracing::info!("Shutdown complete");
    Ok(())
}
