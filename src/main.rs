//! Main entry point for the arena-gate matchmaking backend
//!
//! Loads configuration from the environment with CLI overrides, wires the
//! pipeline through AppState, and supervises graceful shutdown on SIGINT
//! and SIGTERM.

use anyhow::Result;
use arena_gate::config::AppConfig;
use arena_gate::service::AppState;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

/// Arena Gate Matchmaking Backend - waiting pool, match formation, and session gateway
#[derive(Parser)]
#[command(
    name = "arena-gate",
    version,
    about = "Matchmaking backend for competitive multiplayer games",
    long_about = "Arena Gate holds waiting players in a Redis-backed pool, groups them into \
                 matches on a fixed cadence, coordinates game-server allocation over the \
                 event bus, and notifies matched players over their live WebSocket sessions."
)]
struct Args {
    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// AMQP URL override
    #[arg(long, value_name = "URL", help = "Override AMQP broker URL")]
    amqp_url: Option<String>,

    /// Redis address override
    #[arg(long, value_name = "ADDR", help = "Override Redis address (host:port)")]
    redis_addr: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override gateway HTTP port")]
    http_port: Option<u16>,

    /// Metrics port override
    #[arg(long, value_name = "PORT", help = "Override diagnostics server port")]
    metrics_port: Option<u16>,

    /// Players per match override
    #[arg(long, value_name = "N", help = "Override players grouped per match")]
    players_per_match: Option<usize>,

    /// Formation tick interval override
    #[arg(
        long,
        value_name = "SECONDS",
        help = "Override formation loop tick interval"
    )]
    check_interval: Option<u64>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting the service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Arena Gate Matchmaking Backend");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   HTTP port: {}", config.gateway.http_port);
    info!("   Metrics port: {}", config.service.metrics_port);
    info!("   AMQP: {}", config.amqp.url);
    info!("   Redis: {}", config.pool.addr);
    info!("   Pool key: {}", config.pool.pool_key);
    info!(
        "   Players per match: {}",
        config.matchmaking.players_per_match
    );
    info!(
        "   Check interval: {}s",
        config.matchmaking.check_interval_seconds
    );
}

/// Load configuration from the environment and apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::from_env()?;

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(amqp_url) = &args.amqp_url {
        config.amqp.url = amqp_url.clone();
    }

    if let Some(redis_addr) = &args.redis_addr {
        config.pool.addr = redis_addr.clone();
    }

    if let Some(http_port) = args.http_port {
        config.gateway.http_port = http_port;
    }

    if let Some(metrics_port) = args.metrics_port {
        config.service.metrics_port = metrics_port;
    }

    if let Some(players) = args.players_per_match {
        config.matchmaking.players_per_match = players;
    }

    if let Some(interval) = args.check_interval {
        config.matchmaking.check_interval_seconds = interval;
    }

    arena_gate::config::validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config);

    if args.dry_run {
        info!("Configuration validation successful");
        info!("Dry run completed - exiting without starting the service");
        return Ok(());
    }

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Arena Gate is running; press Ctrl+C to shut down gracefully");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");

    let shutdown_budget = config.shutdown_timeout();
    match tokio::time::timeout(shutdown_budget, app_state.shutdown()).await {
        Ok(()) => {
            info!("Graceful shutdown completed successfully");
        }
        Err(_) => {
            warn!("Shutdown budget exceeded, forcing exit");
        }
    }

    info!("Arena Gate stopped");
    Ok(())
}
