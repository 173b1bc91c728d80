//! QRScan - scan QR codes from image files
//!
//! Command-line front end for the scanner lifecycle. The images are replayed
//! as camera frames by [`StillFrameProvider`] and the first QR code found
//! inside the scan window is printed.
//!
//! # Usage
//!
//! ```text
//! qrscan <image>...
//! ```
//!
//! # Execution Flow
//!
//! 1. Load `QRScan Data/QRScan Config.yaml` (defaults if missing) with
//!    `QRSCAN__*` environment overrides
//! 2. Initialize logging → logs/qrscan.<date>
//! 3. Create the tokio runtime that hosts the controlling context
//! 4. Spawn the scanner, size the viewport to the first image and make the
//!    screen visible
//! 5. Wait for `Decoded` or `Failure`, up to `scanner.scan_timeout_secs`
//! 6. Shut the scanner down and log the metrics summary
//!
//! The viewport is scaled so its shorter side equals the configured hole
//! side, so the scan window covers the centred square of each image.

use anyhow::{Context, Result, anyhow, bail};
use camino::Utf8PathBuf;
use qrscan::models::{AuthorizationState, DecodedResult, ScannerSettings};
use qrscan::platform::{StaticAuthorization, StillFrameProvider};
use qrscan::services::{PermissionGate, Size};
use qrscan::{APP_NAME, ConfigManager, Metrics, ScannerLifecycle, StateChange, VERSION, spawn_scanner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    let paths: Vec<Utf8PathBuf> = std::env::args().skip(1).map(Utf8PathBuf::from).collect();
    if paths.is_empty() {
        bail!("Usage: {} <image>...", APP_NAME);
    }

    let config_manager = ConfigManager::new("QRScan Data")?;
    let config = config_manager.load_config()?;

    // Held until exit to keep file logging active
    let _log_guard = qrscan::logging::setup_logging(&config.logging, "qrscan")?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("qrscan-worker")
        .build()?;

    let provider = StillFrameProvider::from_paths(
        &paths,
        Duration::from_millis(config.scanner.frame_interval_ms),
    )?;
    let metrics = Arc::new(Metrics::new());

    let result = runtime.block_on(scan(config.scanner, provider, Arc::clone(&metrics)));

    runtime.shutdown_timeout(Duration::from_secs(5));
    metrics.log_summary();

    match result? {
        Some(decoded) => {
            println!("{}", decoded.alert_title());
            Ok(())
        }
        None => bail!("No QR code found in the scan window"),
    }
}

/// Viewport with the frame's aspect ratio whose shorter side is `hole_side`
fn viewport_for(frame: Size, hole_side: f64) -> Size {
    let shorter = frame.width.min(frame.height);
    if !(shorter > 0.0) {
        return Size::new(hole_side, hole_side);
    }
    let scale = hole_side / shorter;
    Size::new(frame.width * scale, frame.height * scale)
}

async fn scan(
    settings: ScannerSettings,
    provider: StillFrameProvider,
    metrics: Arc<Metrics>,
) -> Result<Option<DecodedResult>> {
    let viewport = viewport_for(
        provider.frame_size().unwrap_or_default(),
        settings.hole_side,
    );
    let scan_timeout = Duration::from_secs(settings.scan_timeout_secs);

    // Reading a file needs no camera permission.
    let gate = Arc::new(PermissionGate::new(Arc::new(StaticAuthorization(
        AuthorizationState::Authorized,
    ))));
    let (lifecycle, channel) = ScannerLifecycle::new(gate, Arc::new(provider), settings, metrics);
    let (handle, task) = spawn_scanner(lifecycle, channel);

    let mut events = handle.subscribe();
    handle.viewport_size_changed(viewport.width, viewport.height);
    handle.become_visible();

    let outcome = async {
        loop {
            match events.recv().await {
                Ok(StateChange::Decoded { raw, symbology }) => {
                    return Ok(Some(DecodedResult {
                        raw_string: raw,
                        symbology,
                    }));
                }
                Ok(StateChange::Failure { reason, message }) => {
                    return Err(anyhow!("Scan failed ({}): {}", reason, message));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} scanner events", skipped);
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    };

    let result = match tokio::time::timeout(scan_timeout, outcome).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("No code decoded within {}s", scan_timeout.as_secs());
            Ok(None)
        }
    };

    handle.shutdown();
    task.await.context("Scanner task panicked")?;

    result
}
