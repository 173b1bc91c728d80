// Scanner metrics module
//
// Lightweight counters for frame flow, decodes and camera ownership

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Scanner metrics
///
/// Uses atomic operations so capture threads and the controlling context can
/// record without locks. `devices_acquired - devices_released` is the number
/// of cameras currently held and must be 0 whenever the screen is not visible.
#[derive(Debug)]
pub struct Metrics {
    /// Frame batches that reached the controlling context for a live activation
    pub frames_delivered: AtomicU64,

    /// Delivered frames that carried no usable code
    pub frames_ignored: AtomicU64,

    /// Batches dropped because their activation was over or not running
    pub stale_frames: AtomicU64,

    pub codes_decoded: AtomicU64,

    pub failures: AtomicU64,

    pub devices_acquired: AtomicU64,

    pub devices_released: AtomicU64,

    /// Permission requests handed to the gate
    pub permission_requests: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_delivered: AtomicU64::new(0),
            frames_ignored: AtomicU64::new(0),
            stale_frames: AtomicU64::new(0),
            codes_decoded: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            devices_acquired: AtomicU64::new(0),
            devices_released: AtomicU64::new(0),
            permission_requests: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_frame_delivered(&self) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_ignored(&self) {
        self.frames_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_frame(&self) {
        self.stale_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decoded(&self) {
        self.codes_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_acquired(&self) {
        self.devices_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_released(&self) {
        self.devices_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_permission_request(&self) {
        self.permission_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Cameras acquired and not yet released
    pub fn devices_held(&self) -> u64 {
        self.devices_acquired
            .load(Ordering::Relaxed)
            .saturating_sub(self.devices_released.load(Ordering::Relaxed))
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Scanner Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Frames: {} delivered, {} ignored, {} stale",
            self.frames_delivered.load(Ordering::Relaxed),
            self.frames_ignored.load(Ordering::Relaxed),
            self.stale_frames.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Results: {} decoded, {} failures, {} permission requests",
            self.codes_decoded.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
            self.permission_requests.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Cameras: {} acquired, {} released",
            self.devices_acquired.load(Ordering::Relaxed),
            self.devices_released.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
