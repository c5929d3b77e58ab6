mod config;
mod delivery;
mod error;
mod identity;
mod lifecycle;
mod location;
mod logging;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use config::{Config, ConnectivityMode, SourceKind};
use delivery::{CollectorClient, ConnectivityGate, DeliveryWorker, ManualGate, SysfsGate};
use identity::DeviceIdentity;
use lifecycle::{LifecycleController, SessionSettings, WakeLease};
use location::{LocationRequest, LocationSource, ReplaySource, SimulatedSource};
use store::{DurableQueue, Preferences, PREFS_FILE, QUEUE_FILE};

#[derive(Parser)]
#[command(name = "location-relay")]
#[command(about = "Samples locations and delivers them to a collector, queuing while offline")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the data directory (queue, preferences, diagnostic trail)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    let _log_guard = logging::init(&config)?;

    info!("location-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Collector: {}", config.collector.url);
    info!("Data directory: {:?}", config.storage.data_dir);

    let data_dir = &config.storage.data_dir;
    let identity = DeviceIdentity::new(Preferences::open(data_dir.join(PREFS_FILE)));
    let device_id = identity.get();
    info!("Device id: {}", device_id);

    let queue = DurableQueue::open(data_dir.join(QUEUE_FILE))?;
    match queue.len() {
        Ok(0) => {}
        Ok(n) => info!("{} record(s) pending from a previous run", n),
        Err(e) => error!("Could not read pending queue: {:#}", e),
    }

    let client = CollectorClient::new(&config.collector)?;
    let gate: Arc<dyn ConnectivityGate> = match config.connectivity.mode {
        ConnectivityMode::Sysfs => Arc::new(SysfsGate::new()),
        ConnectivityMode::AssumeOnline => Arc::new(ManualGate::new(true)),
    };
    let lease = Arc::new(WakeLease::new(Duration::from_secs(config.wake.lease_secs)));
    let worker = DeliveryWorker::new(queue, client, gate, lease);

    let source: Box<dyn LocationSource> = match config.sampling.source {
        SourceKind::Simulated => Box::new(SimulatedSource::new(
            config.sampling.origin_lat,
            config.sampling.origin_lon,
        )),
        SourceKind::Replay => {
            let path = config
                .sampling
                .replay_path
                .clone()
                .context("sampling.source = \"replay\" requires sampling.replay_path")?;
            Box::new(ReplaySource::new(path))
        }
    };

    let settings = SessionSettings {
        request: LocationRequest {
            interval: config.sampling.interval(),
            min_displacement_m: config.sampling.min_displacement_m,
        },
        device_id,
        app_tag: config.app_tag.clone(),
    };

    let mut controller = LifecycleController::new(worker, source, settings);

    match controller.start() {
        Ok(()) => {
            info!("Agent running. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
        }
        Err(e) => error!("Tracking did not start: {}", e),
    }
    info!("Tracking state: {}", controller.state());

    let stats = controller.shutdown().await;
    info!(
        "Session summary: {} delivered, {} queued, {} resent, {} lost",
        stats.delivered, stats.queued, stats.resent, stats.lost
    );

    Ok(())
}
