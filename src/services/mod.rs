//! Services module - the scanner's building blocks.
//!
//! These have no knowledge of the controlling context or of any UI. Each is
//! testable on its own with mocked platform traits.
//!
//! # Components
//!
//! - [`PermissionGate`]: reads the camera authorization and asks once when it
//!   is undecided. Concurrent callers share the one outstanding request.
//! - [`RegionOfInterest`]: pure geometry for the centred scan window, its
//!   mask overlay and its normalized rect of interest.
//! - [`CaptureSession`]: owns the camera for one activation. Configures it
//!   under a scoped [`ConfigurationLock`], starts and stops frame delivery,
//!   and releases the device on every exit path.
//! - [`DecodePipeline`]: first-match-wins over delivered frames, stopping the
//!   session before handing the result back.
//! - [`QrDetector`]: greyscale frame to metadata objects, for backends that
//!   decode in software.

pub mod capture;
pub mod decode;
pub mod detector;
pub mod permission;
pub mod region;

pub use capture::{
    CameraDevice, CaptureError, CaptureSession, ConfigurationLock, DeviceError, DeviceProvider,
    FrameBatch, FrameConsumer, FrameSink, OutputSpec,
};
pub use decode::{DecodePipeline, FrameOutcome};
pub use detector::QrDetector;
pub use permission::{AuthorizationProvider, PermissionGate};
pub use region::{MaskOverlay, Point, Rect, RegionOfInterest, Size};
