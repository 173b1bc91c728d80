// State management module
//
// This module provides the StateManager which wraps ScannerState with thread-safe
// access using Arc<RwLock<T>> and emits change events for the presentation layer.

use crate::models::{
    AuthorizationState, DecodedResult, FailureReason, ScannerState, SessionState, Symbology,
};
use crate::services::region::{MaskOverlay, Size};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// Besides the state diffs, this carries the scanner's outbound events:
/// [`Decoded`](StateChange::Decoded) and [`Failure`](StateChange::Failure).
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The screen became visible or invisible
    VisibilityChanged { is_visible: bool },

    /// The capture session moved to a new state
    SessionStateChanged {
        from: SessionState,
        to: SessionState,
    },

    /// The permission gate observed a new authorization
    AuthorizationChanged { state: AuthorizationState },

    /// The viewport was resized
    ViewportChanged { width: f64, height: f64 },

    /// An activation computed its scan window; draw this mask
    ScanWindowChanged { mask: MaskOverlay },

    /// A code was decoded; the session has already stopped
    Decoded { raw: String, symbology: Symbology },

    /// The activation failed and holds no camera
    Failure {
        reason: FailureReason,
        message: String,
    },

    /// Haptic/audio confirmation cue for the presentation layer
    ConfirmationRequested,

    /// The user cancelled and the scanner has been torn down
    Dismissed,
}

/// Thread-safe scanner state with event emission
///
/// The controlling context is the only writer. Any thread may
/// [`read`](Self::read), take a [`snapshot`](Self::snapshot) or
/// [`subscribe`](Self::subscribe).
///
/// # Related Types
///
/// - [`crate::models::ScannerState`]: The underlying state structure
/// - [`StateChange`]: Event types emitted on state mutations
/// - [`crate::lifecycle::ScannerLifecycle`]: The writer
pub struct StateManager {
    /// The scanner state protected by RwLock for thread-safe access
    state: Arc<RwLock<ScannerState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(ScannerState::default())),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current state
    pub fn snapshot(&self) -> ScannerState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let scanning = state_manager.read(|state| state.is_scanning());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ScannerState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut ScannerState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &ScannerState, new: &ScannerState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_visible != new.is_visible {
            changes.push(StateChange::VisibilityChanged {
                is_visible: new.is_visible,
            });
        }

        if old.viewport != new.viewport {
            changes.push(StateChange::ViewportChanged {
                width: new.viewport.width,
                height: new.viewport.height,
            });
        }

        if old.scan_window != new.scan_window {
            if let Some(mask) = new.scan_window {
                changes.push(StateChange::ScanWindowChanged { mask });
            }
        }

        if old.authorization != new.authorization {
            changes.push(StateChange::AuthorizationChanged {
                state: new.authorization,
            });
        }

        if old.session_state != new.session_state {
            changes.push(StateChange::SessionStateChanged {
                from: old.session_state,
                to: new.session_state,
            });
        }

        changes
    }

    fn emit(&self, event: StateChange, changes: &mut Vec<StateChange>) {
        let _ = self.state_tx.send(event.clone());
        changes.push(event);
    }

    // Convenience methods for common state updates

    pub fn set_visible(&self, is_visible: bool) -> Vec<StateChange> {
        self.update(|state| state.is_visible = is_visible)
    }

    pub fn set_viewport(&self, viewport: Size) -> Vec<StateChange> {
        self.update(|state| state.viewport = viewport)
    }

    pub fn set_scan_window(&self, mask: MaskOverlay) -> Vec<StateChange> {
        self.update(|state| state.scan_window = Some(mask))
    }

    pub fn set_authorization(&self, authorization: AuthorizationState) -> Vec<StateChange> {
        self.update(|state| state.authorization = authorization)
    }

    pub fn set_session_state(&self, session_state: SessionState) -> Vec<StateChange> {
        self.update(|state| state.session_state = session_state)
    }

    /// Start a new activation, clearing the previous activation's results
    pub fn begin_activation(&self, activation: u64) -> Vec<StateChange> {
        self.update(|state| {
            state.activation = activation;
            state.reset_results();
        })
    }

    /// Record a decode: session stopped, then the `Decoded` event
    pub fn record_decoded(&self, result: DecodedResult) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.session_state = SessionState::Stopped;
            state.last_result = Some(result.clone());
            state.decoded_count += 1;
        });

        self.emit(
            StateChange::Decoded {
                raw: result.raw_string,
                symbology: result.symbology,
            },
            &mut changes,
        );

        changes
    }

    /// Record a failed activation, then the `Failure` event
    pub fn record_failure(&self, reason: FailureReason) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.session_state = SessionState::Failed(reason);
            state.last_failure = Some(reason);
            state.failure_count += 1;
        });

        self.emit(
            StateChange::Failure {
                reason,
                message: reason.user_message().to_string(),
            },
            &mut changes,
        );

        changes
    }

    pub fn request_confirmation(&self) -> Vec<StateChange> {
        let mut changes = Vec::new();
        self.emit(StateChange::ConfirmationRequested, &mut changes);
        changes
    }

    /// Mark the scanner as torn down for good
    pub fn mark_torn_down(&self, dismissed: bool) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.is_torn_down = true;
            state.is_visible = false;
        });

        if dismissed {
            self.emit(StateChange::Dismissed, &mut changes);
        }

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
