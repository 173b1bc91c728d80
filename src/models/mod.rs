//! Data models for the scanner.
//!
//! - [`session`]: authorization, session state, failure taxonomy, capture
//!   description and the metadata objects a frame carries
//! - [`config`]: [`AppConfig`] loaded from `QRScan Config.yaml`
//! - [`scanner_state`]: [`ScannerState`], the snapshot published by
//!   [`StateManager`](crate::state::StateManager)

pub mod config;
pub mod scanner_state;
pub mod session;

pub use self::config::{AppConfig, LoggingSettings, ScannerSettings};
pub use scanner_state::ScannerState;
pub use session::{
    AuthorizationState, CaptureConfig, DecodedResult, DeviceSelector, FailureReason,
    MachineReadableCode, MetadataObject, OutputKind, SessionState, Symbology,
};
