use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use image::GrayImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::models::{DeviceSelector, OutputKind, Symbology};
use crate::services::capture::{CameraDevice, DeviceError, DeviceProvider, FrameSink, OutputSpec};
use crate::services::detector::QrDetector;
use crate::services::region::{Point, Rect, Size};

/// Provider of cameras that replay a fixed list of greyscale frames.
///
/// Cameras handed out by one provider share a configuration lock, the way
/// clients of one physical camera do.
#[derive(Debug, Clone)]
pub struct StillFrameProvider {
    frames: Arc<Vec<GrayImage>>,
    interval: Duration,
    config_lock: Arc<AtomicBool>,
}

impl StillFrameProvider {
    pub fn from_frames(frames: Vec<GrayImage>, interval: Duration) -> Self {
        Self {
            frames: Arc::new(frames),
            interval,
            config_lock: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load image files as frames.
    ///
    /// # Errors
    /// Fails on the first file that cannot be opened or decoded.
    pub fn from_paths(paths: &[Utf8PathBuf], interval: Duration) -> Result<Self> {
        let frames = paths
            .iter()
            .map(|path| {
                image::open(path)
                    .map(|img| img.to_luma8())
                    .with_context(|| format!("Failed to load frame image: {}", path))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Loaded {} frame(s) for the still-frame camera", frames.len());
        Ok(Self::from_frames(frames, interval))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Dimensions of the first frame, if any
    pub fn frame_size(&self) -> Option<Size> {
        self.frames
            .first()
            .map(|f| Size::new(f64::from(f.width()), f64::from(f.height())))
    }
}

impl DeviceProvider for StillFrameProvider {
    fn acquire(&self, selector: DeviceSelector) -> Option<Box<dyn CameraDevice>> {
        if self.frames.is_empty() {
            tracing::warn!("No frames to replay, no camera for {:?}", selector);
            return None;
        }
        Some(Box::new(StillFrameCamera {
            frames: Arc::clone(&self.frames),
            interval: self.interval,
            config_lock: Arc::clone(&self.config_lock),
            holds_lock: false,
            has_input: false,
            output: None,
            stop_tx: None,
            worker: None,
        }))
    }
}

/// Camera that plays its frames once on a capture thread, decoding each
/// inside the rect of interest.
pub struct StillFrameCamera {
    frames: Arc<Vec<GrayImage>>,
    interval: Duration,
    config_lock: Arc<AtomicBool>,
    holds_lock: bool,
    has_input: bool,
    output: Option<(Rect, FrameSink)>,
    /// Sending or dropping this wakes the capture thread out of its
    /// inter-frame wait
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl CameraDevice for StillFrameCamera {
    fn label(&self) -> String {
        format!("still frames ({} images)", self.frames.len())
    }

    fn frame_dimensions(&self) -> Size {
        self.frames
            .first()
            .map(|f| Size::new(f64::from(f.width()), f64::from(f.height())))
            .unwrap_or_default()
    }

    fn lock_for_configuration(&mut self) -> Result<(), DeviceError> {
        self.config_lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DeviceError::LockHeld)?;
        self.holds_lock = true;
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        if self.holds_lock {
            self.config_lock.store(false, Ordering::Release);
            self.holds_lock = false;
        }
    }

    fn set_focus_point_of_interest(&mut self, point: Point) {
        tracing::debug!("Focus point of interest ({:.3}, {:.3})", point.x, point.y);
    }

    fn add_input(&mut self) -> Result<(), DeviceError> {
        if self.has_input {
            return Err(DeviceError::InputRejected("input already attached".into()));
        }
        self.has_input = true;
        Ok(())
    }

    fn add_output(&mut self, output: &OutputSpec, sink: FrameSink) -> Result<(), DeviceError> {
        if output.kind != OutputKind::MachineReadableCode || self.output.is_some() {
            return Err(DeviceError::OutputRejected("output already attached".into()));
        }
        if !output.symbologies.contains(&Symbology::Qr) {
            return Err(DeviceError::OutputRejected(format!(
                "software decoding supports QR only, asked for {:?}",
                output.symbologies
            )));
        }
        self.output = Some((output.rect_of_interest, sink));
        Ok(())
    }

    fn start_running(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let Some((rect, sink)) = self.output.clone() else {
            tracing::warn!("Still-frame camera started without an output");
            return;
        };

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let frames = Arc::clone(&self.frames);
        let interval = self.interval;

        let spawned = thread::Builder::new()
            .name("qrscan-capture".into())
            .spawn(move || {
                let detector = QrDetector::new();
                for (index, frame) in frames.iter().enumerate() {
                    if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
                        break;
                    }
                    let objects = detector.detect(frame, &rect);
                    tracing::trace!("Frame {}: {} metadata object(s)", index, objects.len());
                    if !sink.deliver(objects) {
                        break;
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("Capture thread finished");
            });

        match spawned {
            Ok(worker) => {
                self.stop_tx = Some(stop_tx);
                self.worker = Some(worker);
            }
            Err(e) => tracing::error!("Failed to spawn capture thread: {}", e),
        }
    }

    fn stop_running(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn release(&mut self) {
        self.stop_running();
        self.output = None;
        self.has_input = false;
        self.unlock_for_configuration();
    }
}
