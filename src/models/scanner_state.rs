use super::session::{AuthorizationState, DecodedResult, FailureReason, SessionState};
use crate::services::region::{MaskOverlay, Size};

/// Observable snapshot of the scanner.
///
/// The controlling context is the only writer; it goes through
/// [`StateManager`](crate::state::StateManager) so that observers on other
/// threads get change events instead of polling.
///
/// # Related Types
///
/// - [`crate::state::StateManager`]: Thread-safe wrapper with event emission
/// - [`crate::state::StateChange`]: Event types for state mutations
/// - [`crate::lifecycle::ScannerLifecycle`]: The writer
#[derive(Clone, Debug, Default)]
pub struct ScannerState {
    // Screen
    pub is_visible: bool,
    pub viewport: Size,
    /// Dimmed mask of the current activation. Its hole is the rectangle the
    /// rect of interest was derived from.
    pub scan_window: Option<MaskOverlay>,

    // Session
    pub session_state: SessionState,
    pub authorization: AuthorizationState,
    pub activation: u64,

    // Results
    pub last_result: Option<DecodedResult>,
    pub last_failure: Option<FailureReason>,
    pub decoded_count: usize,
    pub failure_count: usize,

    pub is_torn_down: bool,
}

impl ScannerState {
    /// Whether the camera is currently held and delivering frames.
    pub fn is_scanning(&self) -> bool {
        self.session_state.is_running()
    }

    /// Forget results from previous activations.
    pub fn reset_results(&mut self) {
        self.last_result = None;
        self.last_failure = None;
    }
}
