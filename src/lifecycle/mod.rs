// Lifecycle module - scanner orchestration and its controlling context
//
// This module contains:
// - ScannerLifecycle: state machine driven by visibility signals
// - spawn_scanner / ScannerHandle: the single task that runs it and the handle
//   the presentation layer talks to

pub mod context;
pub mod controller;

pub use context::{ScannerHandle, spawn_scanner};
pub use controller::{ControlChannel, ControlMessage, ScannerLifecycle};
