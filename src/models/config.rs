use serde::{Deserialize, Serialize};

use super::session::{CaptureConfig, DeviceSelector, Symbology};

/// Top-level configuration from `QRScan Config.yaml`
///
/// Every field has a default, so an empty or missing file is valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerSettings,
    pub logging: LoggingSettings,
}

/// Scan window, capture device and decoding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Side of the square scan window, in viewport units
    pub hole_side: f64,

    /// Corner radius of the transparent hole in the dimmed mask
    pub corner_radius: f64,

    /// Opacity of the dimmed mask around the hole
    pub mask_opacity: f32,

    pub device: DeviceSelector,

    pub symbologies: Vec<Symbology>,

    /// Ask the presentation layer for a haptic/audio cue after a decode
    pub confirmation_feedback: bool,

    /// How long the command-line scanner waits for a code
    pub scan_timeout_secs: u64,

    /// Delay between replayed frames for the still-frame camera
    pub frame_interval_ms: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            hole_side: default_hole_side(),
            corner_radius: 12.0,
            mask_opacity: 0.5,
            device: DeviceSelector::Back,
            symbologies: vec![Symbology::Qr],
            confirmation_feedback: true,
            scan_timeout_secs: 30,
            frame_interval_ms: 100,
        }
    }
}

impl ScannerSettings {
    /// Build the capture description for a new activation
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig::new(self.device, self.symbologies.clone())
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub debug_mode: bool,
    pub log_dir: String,
    pub console_output: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            debug_mode: false,
            log_dir: "logs".to_string(),
            console_output: true,
        }
    }
}

fn default_hole_side() -> f64 {
    270.0
}
