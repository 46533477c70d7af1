//! proxied-proxy: chained forward proxy with auth, blocking and interception.
//!
//! Parses the CLI, loads the merged configuration, then runs the first hop
//! and (unless disabled) the second hop on one multi-threaded runtime until
//! Ctrl-C.
//!
//! - **Audit logging**: JSON events to syslog when `[telemetry] syslog = true`
//! - **Debug logging**: `tracing` to stderr, level from `-v` or `RUST_LOG`

use anyhow::{Context, Result};
use clap::Parser;
use proxied_proxy::{
    cli::Cli,
    config::{Config, ConfigLoader},
    proxy::ProxyServer,
    telemetry::AuditLogger,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    debug!("Parsed CLI arguments: {:?}", cli);

    let config = ConfigLoader::new()
        .load(&cli)
        .context("Failed to load configuration")?;

    debug!("Loaded configuration: {:?}", config);

    let audit = if config.telemetry.syslog_enabled() {
        Arc::new(AuditLogger::new().context("Failed to initialize telemetry")?)
    } else {
        Arc::new(AuditLogger::new_null())
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    rt.block_on(run(config, audit))
}

/// Bind both listeners, serve until Ctrl-C, then stop accepting.
async fn run(config: Config, audit: Arc<AuditLogger>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let first_hop = ProxyServer::bind(config.first_hop_config(audit.clone())?, shutdown_rx.clone())
        .await
        .with_context(|| format!("Failed to bind first hop on {}", config.first_hop.listen))?;

    let mut listeners = vec![tokio::spawn(first_hop.run())];

    if let Some(second_hop_config) = config.second_hop_config(audit)? {
        let second_hop = ProxyServer::bind(second_hop_config, shutdown_rx)
            .await
            .with_context(|| {
                format!("Failed to bind second hop on {}", config.second_hop.listen)
            })?;
        info!(
            "Second hop chaining through {}",
            config.second_hop.upstream
        );
        listeners.push(tokio::spawn(second_hop.run()));
    }

    info!(
        "Blocking '{}' on all listeners",
        config.policy.blocked_domain
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");
    let _ = shutdown_tx.send(true);

    for listener in listeners {
        listener.await.context("Listener task panicked")??;
    }

    Ok(())
}

/// Initialize the tracing subscriber for debug/development logging.
///
/// This is separate from the audit telemetry which goes to syslog.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG`, or warnings and errors
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
