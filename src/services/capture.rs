use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::metrics::Metrics;
use crate::models::{
    CaptureConfig, DeviceSelector, FailureReason, MetadataObject, OutputKind, SessionState,
    Symbology,
};
use crate::services::region::{Point, Rect, RegionOfInterest, Size};

/// Errors reported by a camera backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Configuration lock is held by another client")]
    LockHeld,

    #[error("Session cannot accept the device input: {0}")]
    InputRejected(String),

    #[error("Session cannot accept the metadata output: {0}")]
    OutputRejected(String),

    #[error("Device disconnected")]
    Disconnected,
}

/// Errors that can occur while configuring or driving a capture session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No camera matching {0:?} is available")]
    DeviceUnavailable(DeviceSelector),

    #[error("Camera is locked for configuration by another client")]
    DeviceLocked,

    #[error("Input rejected: {0}")]
    InputRejected(String),

    #[error("Output rejected: {0}")]
    OutputRejected(String),

    #[error("Cannot {action} a session in state {from:?}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },
}

impl CaptureError {
    /// Failure class reported to the presentation layer
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::DeviceUnavailable(_) | Self::DeviceLocked => FailureReason::DeviceUnavailable,
            Self::InputRejected(_) => FailureReason::InputRejected,
            // A misuse of the state machine is a topology bug as far as the
            // user is concerned.
            Self::OutputRejected(_) | Self::InvalidTransition { .. } => {
                FailureReason::OutputRejected
            }
        }
    }
}

/// Metadata output attached to the session
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub kind: OutputKind,
    pub symbologies: Vec<Symbology>,
    /// Region searched for symbols, in normalized device coordinates
    pub rect_of_interest: Rect,
}

/// One frame's worth of metadata, tagged with the activation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBatch {
    pub activation: u64,
    pub objects: Vec<MetadataObject>,
}

/// Callback receiving frame batches. Registered by the controlling context.
pub type FrameConsumer = Arc<dyn Fn(FrameBatch) + Send + Sync>;

/// Handle a camera backend uses to deliver frames.
///
/// Backends call [`deliver`](Self::deliver) from their capture thread. The
/// consumer runs while the sink lock is held, and [`CaptureSession::stop`]
/// detaches the consumer under the same lock, so once `stop()` has returned
/// no further frame reaches the consumer.
#[derive(Clone)]
pub struct FrameSink {
    consumer: Arc<Mutex<Option<FrameConsumer>>>,
    activation: u64,
}

impl FrameSink {
    pub fn new(activation: u64, consumer: FrameConsumer) -> Self {
        Self {
            consumer: Arc::new(Mutex::new(Some(consumer))),
            activation,
        }
    }

    /// Forward one frame's metadata. Returns `false` once detached.
    pub fn deliver(&self, objects: Vec<MetadataObject>) -> bool {
        let slot = self.lock();
        match slot.as_ref() {
            Some(consumer) => {
                consumer(FrameBatch {
                    activation: self.activation,
                    objects,
                });
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    pub fn activation(&self) -> u64 {
        self.activation
    }

    fn detach(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<FrameConsumer>> {
        self.consumer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSink")
            .field("activation", &self.activation)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// A physical camera plus the platform session wiring around it.
#[cfg_attr(test, mockall::automock)]
pub trait CameraDevice: Send {
    fn label(&self) -> String;

    /// Size of the frames this device produces
    fn frame_dimensions(&self) -> Size;

    /// Take the exclusive configuration lock. Fails if another client holds it.
    fn lock_for_configuration(&mut self) -> Result<(), DeviceError>;

    fn unlock_for_configuration(&mut self);

    fn set_focus_point_of_interest(&mut self, point: Point);

    /// Wire the device in as the session's input
    fn add_input(&mut self) -> Result<(), DeviceError>;

    /// Attach the metadata output and register `sink` as its frame consumer
    fn add_output(&mut self, output: &OutputSpec, sink: FrameSink) -> Result<(), DeviceError>;

    fn start_running(&mut self);

    fn stop_running(&mut self);

    /// Detach inputs and outputs and give the camera back to the platform
    fn release(&mut self);
}

/// Source of camera devices.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceProvider: Send + Sync {
    fn acquire(&self, selector: DeviceSelector) -> Option<Box<dyn CameraDevice>>;
}

/// Scoped exclusive configuration lock on a device.
///
/// The lock is released when the guard drops, whichever way the
/// configuration block is left.
pub struct ConfigurationLock<'a, D: CameraDevice + ?Sized> {
    device: &'a mut D,
}

impl<'a, D: CameraDevice + ?Sized> ConfigurationLock<'a, D> {
    pub fn acquire(device: &'a mut D) -> Result<Self, DeviceError> {
        device.lock_for_configuration()?;
        Ok(Self { device })
    }

    pub fn device(&mut self) -> &mut D {
        self.device
    }
}

impl<D: CameraDevice + ?Sized> Drop for ConfigurationLock<'_, D> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
    }
}

/// Capture session for one activation.
///
/// Owns the camera from [`configure`](Self::configure) until
/// [`teardown`](Self::teardown) (or drop). Every failure path releases the
/// device before returning.
pub struct CaptureSession {
    activation: u64,
    state: SessionState,
    device: Option<Box<dyn CameraDevice>>,
    sink: FrameSink,
    metrics: Arc<Metrics>,
}

impl CaptureSession {
    /// Create an idle session whose frames go to `consumer`
    pub fn new(activation: u64, consumer: FrameConsumer, metrics: Arc<Metrics>) -> Self {
        Self {
            activation,
            state: SessionState::Idle,
            device: None,
            sink: FrameSink::new(activation, consumer),
            metrics,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn activation(&self) -> u64 {
        self.activation
    }

    pub fn holds_device(&self) -> bool {
        self.device.is_some()
    }

    /// Acquire a device and wire input and output.
    ///
    /// On error the session is `Failed` and holds no device.
    pub fn configure(
        &mut self,
        provider: &dyn DeviceProvider,
        config: &CaptureConfig,
        region: &RegionOfInterest,
    ) -> Result<(), CaptureError> {
        if self.state != SessionState::Idle {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                action: "configure",
            });
        }
        self.state = SessionState::Configuring;

        let Some(device) = provider.acquire(config.device_selector) else {
            return Err(self.fail(CaptureError::DeviceUnavailable(config.device_selector)));
        };
        self.metrics.record_device_acquired();
        tracing::info!(
            "Acquired camera '{}' for activation {}",
            device.label(),
            self.activation
        );
        let device = self.device.insert(device);

        let frame = device.frame_dimensions();
        let output = OutputSpec {
            kind: config.output_kind,
            symbologies: config.accepted_symbologies.clone(),
            rect_of_interest: region.normalized_rect(frame),
        };
        tracing::debug!(
            "Scan window {:?} -> rect of interest {:?} (frame {}x{})",
            region.rect(),
            output.rect_of_interest,
            frame.width,
            frame.height
        );

        let result = Self::wire(
            device.as_mut(),
            &output,
            region.focus_point(frame),
            self.sink.clone(),
        );
        if let Err(e) = result {
            return Err(self.fail(e));
        }

        Ok(())
    }

    fn wire(
        device: &mut dyn CameraDevice,
        output: &OutputSpec,
        focus: Point,
        sink: FrameSink,
    ) -> Result<(), CaptureError> {
        let mut lock = ConfigurationLock::acquire(device).map_err(|e| {
            tracing::warn!("Could not lock camera for configuration: {}", e);
            CaptureError::DeviceLocked
        })?;

        lock.device().set_focus_point_of_interest(focus);

        lock.device().add_input().map_err(|e| match e {
            DeviceError::InputRejected(msg) => CaptureError::InputRejected(msg),
            other => CaptureError::InputRejected(other.to_string()),
        })?;

        lock.device().add_output(output, sink).map_err(|e| match e {
            DeviceError::OutputRejected(msg) => CaptureError::OutputRejected(msg),
            other => CaptureError::OutputRejected(other.to_string()),
        })?;

        Ok(())
    }

    /// Begin delivering frames. Idempotent while running.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        match self.state {
            SessionState::Running => Ok(()),
            SessionState::Configuring => match self.device.as_mut() {
                Some(device) => {
                    device.start_running();
                    self.state = SessionState::Running;
                    tracing::info!("Capture session {} running", self.activation);
                    Ok(())
                }
                None => Err(CaptureError::InvalidTransition {
                    from: self.state,
                    action: "start",
                }),
            },
            from => Err(CaptureError::InvalidTransition {
                from,
                action: "start",
            }),
        }
    }

    /// Stop delivering frames. Idempotent; never fails.
    ///
    /// The frame consumer is detached before this returns.
    pub fn stop(&mut self) {
        self.sink.detach();
        if self.state != SessionState::Running {
            return;
        }
        if let Some(device) = self.device.as_mut() {
            device.stop_running();
        }
        self.state = SessionState::Stopped;
        tracing::info!("Capture session {} stopped", self.activation);
    }

    /// Release the device. Safe to call repeatedly and from any state.
    pub fn teardown(&mut self) {
        self.stop();
        if let Some(mut device) = self.device.take() {
            device.release();
            self.metrics.record_device_released();
            tracing::debug!("Released camera for activation {}", self.activation);
        }
    }

    fn fail(&mut self, error: CaptureError) -> CaptureError {
        tracing::warn!("Capture session {} failed: {}", self.activation, error);
        self.teardown();
        self.state = SessionState::Failed(error.failure_reason());
        error
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("activation", &self.activation)
            .field("state", &self.state)
            .field("holds_device", &self.holds_device())
            .finish()
    }
}
