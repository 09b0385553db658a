//! Camera arbiter demo entry point.
//!
//! Runs the arbiter against the simulated camera backend so its arbitration
//! rules can be watched from a terminal:
//!
//! ```text
//! main()
//!  └─ load ArbiterConfig          -- --config PATH or the platform path
//!  └─ SimulatedCameraBackend      -- cameras and latencies from [simulator]
//!  └─ RetryingDeviceOpener        -- policy from [opener]
//!  └─ CameraArbiter::start()      -- spawns the request loop
//!       └─ open(id, share) for each CAMERA_ID, one watcher task per handle
//!  └─ hold, close_all, shutdown, print the device log
//! ```
//!
//! Example: `RUST_LOG=debug camera-arbiter 0 1` opens camera 0, then closes
//! it again to open camera 1 exclusively.  Add `--share` to keep both open.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camera_arbiter::infrastructure::device::retrying_opener::RetryingDeviceOpener;
use camera_arbiter::infrastructure::device::simulated::{DeviceEvent, SimulatedCameraBackend};
use camera_arbiter::infrastructure::permissions::StaticPermissions;
use camera_arbiter::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, ArbiterConfig,
};
use camera_arbiter::{CameraArbiter, VirtualCamera};
use camera_core::CameraId;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Single-consumer camera session arbiter, driven against simulated cameras.
#[derive(Debug, Parser)]
#[command(
    name = "camera-arbiter",
    about = "Opens simulated cameras through the camera session arbiter",
    version
)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, env = "CAMERA_ARBITER_CONFIG")]
    config: Option<PathBuf>,

    /// Open cameras in share mode, so earlier cameras stay open.
    #[arg(long)]
    share: bool,

    /// Run as if camera permission had not been granted.
    #[arg(long)]
    deny_permission: bool,

    /// How long to keep the cameras open before closing everything.
    #[arg(long, default_value_t = 1500, env = "CAMERA_ARBITER_HOLD_MS")]
    hold_ms: u64,

    /// Write a default config file to the config path and exit.
    #[arg(long)]
    init_config: bool,

    /// Cameras to open, in order.  Defaults to every simulated camera.
    cameras: Vec<CameraId>,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given and no platform config dir"),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path()?;

    if cli.init_config {
        save_config_to(&config_path, &ArbiterConfig::default())
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!("wrote default config to {}", config_path.display());
        return Ok(());
    }

    let config = load_config_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.arbiter.log_level)),
        )
        .init();

    let camera_ids = if cli.cameras.is_empty() {
        config
            .simulator
            .cameras
            .iter()
            .map(|id| CameraId::new(id.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .context("invalid camera id in [simulator] cameras")?
    } else {
        cli.cameras.clone()
    };

    let backend = SimulatedCameraBackend::new(config.simulator.cameras.iter().map(String::as_str))
        .with_latency(config.simulator.open_latency(), config.simulator.close_latency());
    let opener = RetryingDeviceOpener::new(
        Arc::new(backend.clone()),
        config.opener.retry_policy(),
    );
    let permissions = StaticPermissions::new(!cli.deny_permission);
    let arbiter = CameraArbiter::start(Arc::new(permissions), Arc::new(opener));

    info!(
        "camera arbiter demo starting: {} camera(s), share={}",
        camera_ids.len(),
        cli.share
    );

    let mut watchers = Vec::new();
    for camera_id in camera_ids {
        let handle = arbiter.open(camera_id, cli.share);
        watchers.push(tokio::spawn(log_transitions(handle)));
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(cli.hold_ms)) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("failed to listen for Ctrl+C signal: {e}");
            } else {
                info!("received Ctrl+C, closing cameras early");
            }
        }
    }

    arbiter.close_all();
    arbiter.shutdown().await;
    for watcher in watchers {
        watcher.abort();
    }

    println!("device log:");
    for event in backend.events() {
        match event {
            DeviceEvent::Opened(id) => println!("  opened {id}"),
            DeviceEvent::Closed(id) => println!("  closed {id}"),
        }
    }
    Ok(())
}

/// Logs every state change of `handle` until it reaches a terminal state.
async fn log_transitions(handle: VirtualCamera) {
    let mut states = handle.subscribe();
    loop {
        let state = *states.borrow_and_update();
        match handle.failure() {
            Some(reason) => info!("camera {} handle {}: {state:?} ({reason})", handle.camera_id(), handle.id()),
            None => info!("camera {} handle {}: {state:?}", handle.camera_id(), handle.id()),
        }
        if state.is_terminal() || states.changed().await.is_err() {
            break;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
