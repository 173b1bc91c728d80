// QRScan - camera QR scanner lifecycle
//
// This is the library crate: permission gating, the scan window geometry, the
// capture session, first-match decoding and the lifecycle that ties them to a
// screen's visibility. The binary crate (main.rs) scans image files with it.

pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod platform;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use self::config::ConfigManager;
pub use lifecycle::{ScannerHandle, ScannerLifecycle, spawn_scanner};
pub use metrics::Metrics;
pub use models::{AppConfig, DecodedResult, FailureReason, ScannerState, SessionState};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
