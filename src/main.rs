//! Roomcast Server
//!
//! Run with: `roomcast serve [--config path]`
//!
//! # Configuration
//!
//! Settings come from a TOML file (`--config`, or the first of
//! `~/.config/roomcast/config.toml`, `/etc/roomcast/config.toml`,
//! `./config.toml`) with environment overrides:
//! - `ROOMCAST_HOST`, `ROOMCAST_PORT`: bind address (default: 0.0.0.0:8000)
//! - `ROOMCAST_DEFAULT_ROOM`: room for connections that name none (default: General)
//! - `ROOMCAST_OUTBOUND_CAPACITY`: per-connection queue bound (default: 256)
//! - `ROOMCAST_REDIS_ENABLED`, `ROOMCAST_REDIS_URL`: cross-instance fanout
//! - `ROOMCAST_LOG_LEVEL`, `ROOMCAST_LOG_FORMAT`: logging (`RUST_LOG` wins)
//!
//! `roomcast config` prints a commented default configuration file.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use roomcast::api::{serve, AppState};
use roomcast::config::{generate_default_config, Config, LoggingConfig};
use roomcast::fanout::RedisBridge;
use roomcast::hub::{Hub, HubServices, InstanceId};
use roomcast::metrics::RoomcastMetrics;
use roomcast::presence::{InMemoryPresence, Presence, RedisPresence};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "roomcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time chat room fanout hub")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the WebSocket server
    Serve {
        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print a default configuration file
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            let mut config = match config {
                Some(path) => Config::load_with_env(&path)
                    .with_context(|| format!("loading configuration from {}", path.display()))?,
                None => Config::load_default(),
            };
            if let Some(port) = port {
                config.server.port = port;
            }

            init_logging(&config.logging);
            run(config).await
        }
        Commands::Config => {
            print!("{}", generate_default_config());
            Ok(())
        }
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("roomcast={},tower_http=info", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let instance = InstanceId::new();
    tracing::info!(instance = %instance, "Starting Roomcast v{}", env!("CARGO_PKG_VERSION"));

    let metrics = Arc::new(RoomcastMetrics::new().context("registering metrics")?);
    let mut services = HubServices {
        metrics: Some(Arc::clone(&metrics)),
        ..HubServices::default()
    };
    let mut bridge = None;
    let mut background = Vec::new();

    let presence: Arc<dyn Presence> = if config.redis.enabled && config.redis.presence {
        let (presence, worker) =
            RedisPresence::spawn(&config.redis).context("creating Redis presence store")?;
        background.push(worker);
        tracing::info!(url = %config.redis.url, "Presence stored in Redis");
        Arc::new(presence)
    } else {
        Arc::new(InMemoryPresence::new())
    };
    services.presence = Some(Arc::clone(&presence));

    if config.redis.enabled {
        let (fanout, redis_bridge) =
            RedisBridge::new(&config.redis, instance).context("creating Redis fanout bridge")?;
        services.fanout = Some(Arc::new(fanout));
        bridge = Some(redis_bridge);
        tracing::info!(url = %config.redis.url, "Cross-instance fanout enabled");
    } else {
        tracing::info!("Cross-instance fanout disabled (set ROOMCAST_REDIS_ENABLED to enable)");
    }

    let (hub, hub_task) = Hub::spawn(instance, config.hub.clone(), services);

    let mut state = AppState::new(hub.clone(), config.server.clone())
        .with_presence(presence)
        .with_metrics(metrics);
    if let Some(redis_bridge) = bridge {
        state = state.with_bridge(redis_bridge.metrics());
        background.push(redis_bridge.spawn(&hub));
    }

    serve(state, &config.server).await?;

    // The hub stops with its last handle; that drops the fanout and presence
    // queues, which in turn ends the bridge and the presence worker.
    drop(hub);
    match tokio::time::timeout(SHUTDOWN_GRACE, hub_task).await {
        Ok(Err(e)) => tracing::warn!(error = %e, "Hub task ended abnormally"),
        Err(_) => tracing::warn!("Hub still busy at shutdown"),
        Ok(Ok(())) => {}
    }

    for mut task in background {
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            tracing::warn!("Background task still running at shutdown, aborting");
            task.abort();
        }
    }

    tracing::info!("Roomcast stopped");
    Ok(())
}
