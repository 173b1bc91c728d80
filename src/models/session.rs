use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::region::Rect;

/// Camera authorization as reported by the platform.
///
/// The platform persists this process-wide. The scanner reads it and may ask
/// for it once, but never writes or resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthorizationState {
    /// The user has not been asked yet.
    #[default]
    Unknown,
    Authorized,
    Denied,
    /// Access is blocked by policy (parental controls, MDM, ...).
    Restricted,
}

impl AuthorizationState {
    /// Whether this state forbids camera access without asking.
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Denied | Self::Restricted)
    }
}

/// Why a scanner activation failed.
///
/// None of these are retried by the scanner. Recovery is the caller's job
/// (leave the screen and come back, which re-runs the permission gate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    PermissionDenied,
    DeviceUnavailable,
    InputRejected,
    OutputRejected,
}

impl FailureReason {
    /// Human-readable text shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Unable to access your camera, do check camera setting in device's settings."
            }
            Self::DeviceUnavailable | Self::InputRejected | Self::OutputRejected => {
                "Your device does not support scanning a code from an item. Please use a device with a camera."
            }
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PermissionDenied => "permission denied",
            Self::DeviceUnavailable => "device unavailable",
            Self::InputRejected => "input rejected",
            Self::OutputRejected => "output rejected",
        };
        f.write_str(name)
    }
}

/// Capture session state machine.
///
/// `Idle -> Configuring -> Running -> {Stopped | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Configuring,
    Running,
    Stopped,
    Failed(FailureReason),
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Optical code formats a capture output may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    Qr,
    Aztec,
    DataMatrix,
    Pdf417,
    Ean13,
    Code128,
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Qr => "QR",
            Self::Aztec => "Aztec",
            Self::DataMatrix => "DataMatrix",
            Self::Pdf417 => "PDF417",
            Self::Ean13 => "EAN-13",
            Self::Code128 => "Code 128",
        };
        f.write_str(name)
    }
}

/// Which physical camera to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelector {
    /// Default rear-facing video camera.
    #[default]
    Back,
    Front,
    /// Whatever video device the platform offers first.
    Any,
}

/// The kind of output attached to the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    #[default]
    MachineReadableCode,
}

/// Immutable description of what to capture, rebuilt on every activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub device_selector: DeviceSelector,
    pub output_kind: OutputKind,
    pub accepted_symbologies: Vec<Symbology>,
}

impl CaptureConfig {
    pub fn new(device_selector: DeviceSelector, accepted_symbologies: Vec<Symbology>) -> Self {
        Self {
            device_selector,
            output_kind: OutputKind::MachineReadableCode,
            accepted_symbologies,
        }
    }

    pub fn accepts(&self, symbology: Symbology) -> bool {
        self.accepted_symbologies.contains(&symbology)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::new(DeviceSelector::Back, vec![Symbology::Qr])
    }
}

/// A decoded machine-readable code as reported for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineReadableCode {
    pub symbology: Symbology,
    /// `None` when the symbol was located but its payload could not be read.
    pub string_value: Option<String>,
    /// Symbol bounds in normalized frame coordinates, when known.
    pub bounds: Option<Rect>,
}

impl MachineReadableCode {
    pub fn new(symbology: Symbology, string_value: impl Into<String>) -> Self {
        Self {
            symbology,
            string_value: Some(string_value.into()),
            bounds: None,
        }
    }

    pub fn unreadable(symbology: Symbology) -> Self {
        Self {
            symbology,
            string_value: None,
            bounds: None,
        }
    }
}

/// One metadata object attached to a delivered frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataObject {
    MachineReadableCode(MachineReadableCode),
    Face { bounds: Rect },
    /// Anything else the platform reports (body, salient object, ...).
    Other { kind: String },
}

impl MetadataObject {
    pub fn code(symbology: Symbology, payload: impl Into<String>) -> Self {
        Self::MachineReadableCode(MachineReadableCode::new(symbology, payload))
    }

    pub fn as_code(&self) -> Option<&MachineReadableCode> {
        match self {
            Self::MachineReadableCode(code) => Some(code),
            _ => None,
        }
    }
}

/// The single result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResult {
    pub raw_string: String,
    pub symbology: Symbology,
}

impl DecodedResult {
    /// Alert title the presentation layer shows for this result.
    pub fn alert_title(&self) -> String {
        format!("{} code scanned\n{}", self.symbology, self.raw_string)
    }
}
