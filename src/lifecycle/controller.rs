// Scanner lifecycle - orchestrates permission, capture and decoding
//
// Bound to the screen's visibility signals. Every method here runs on the
// controlling context (see `context.rs`); nothing in this file locks.

use crate::metrics::Metrics;
use crate::models::{AuthorizationState, FailureReason, ScannerSettings, SessionState};
use crate::services::capture::{CaptureError, CaptureSession, DeviceProvider, FrameBatch, FrameConsumer};
use crate::services::decode::{DecodePipeline, FrameOutcome};
use crate::services::permission::PermissionGate;
use crate::services::region::{RegionOfInterest, Size};
use crate::state::StateManager;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages processed by the controlling context, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    BecomeVisible,
    BecomeInvisible,
    ViewportSizeChanged { width: f64, height: f64 },
    /// Terminal teardown plus a dismiss signal
    UserCancelled,
    /// Terminal teardown without dismissing
    Shutdown,
    PermissionResolved {
        activation: u64,
        state: AuthorizationState,
    },
    Frame(FrameBatch),
}

/// Both ends of a lifecycle's mailbox, handed to
/// [`spawn_scanner`](super::spawn_scanner).
///
/// The sender here is the only strong one. The lifecycle, its frame
/// consumers and its permission tasks hold weak senders, so the control loop
/// ends once every [`ScannerHandle`](super::ScannerHandle) is gone.
pub struct ControlChannel {
    pub(crate) sender: mpsc::UnboundedSender<ControlMessage>,
    pub(crate) receiver: mpsc::UnboundedReceiver<ControlMessage>,
}

/// Scanner state machine for one screen instance.
///
/// Exclusively owns the [`CaptureSession`] of the current activation and
/// releases it on every exit path: first match, invisibility, failure and
/// teardown.
///
/// An activation starts each time the screen becomes visible while not
/// already scanning. Frames and permission outcomes carry the activation
/// they belong to; anything from an older activation is dropped.
pub struct ScannerLifecycle {
    gate: Arc<PermissionGate>,
    provider: Arc<dyn DeviceProvider>,
    settings: ScannerSettings,
    state: StateManager,
    metrics: Arc<Metrics>,

    /// Weak sender side of this lifecycle's own mailbox, for frames and
    /// permission outcomes.
    mailbox: mpsc::WeakUnboundedSender<ControlMessage>,

    session: Option<CaptureSession>,
    pipeline: Option<DecodePipeline>,

    viewport: Size,
    is_visible: bool,
    activation: u64,
    permission_pending: bool,
    /// Authorized and visible, waiting for the first non-empty viewport
    awaiting_viewport: bool,
    torn_down: bool,
}

impl ScannerLifecycle {
    /// Create a lifecycle and its mailbox.
    pub fn new(
        gate: Arc<PermissionGate>,
        provider: Arc<dyn DeviceProvider>,
        settings: ScannerSettings,
        metrics: Arc<Metrics>,
    ) -> (Self, ControlChannel) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let lifecycle = Self {
            gate,
            provider,
            settings,
            state: StateManager::new(),
            metrics,
            mailbox: sender.downgrade(),
            session: None,
            pipeline: None,
            viewport: Size::default(),
            is_visible: false,
            activation: 0,
            permission_pending: false,
            awaiting_viewport: false,
            torn_down: false,
        };
        (lifecycle, ControlChannel { sender, receiver })
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn session_state(&self) -> SessionState {
        self.state.read(|s| s.session_state)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Dispatch one message. Returns `false` once the scanner is torn down.
    pub fn handle(&mut self, message: ControlMessage) -> bool {
        match message {
            ControlMessage::BecomeVisible => self.become_visible(),
            ControlMessage::BecomeInvisible => self.become_invisible(),
            ControlMessage::ViewportSizeChanged { width, height } => {
                self.viewport_size_changed(width, height)
            }
            ControlMessage::UserCancelled => self.teardown(true),
            ControlMessage::Shutdown => self.teardown(false),
            ControlMessage::PermissionResolved { activation, state } => {
                self.permission_resolved(activation, state)
            }
            ControlMessage::Frame(batch) => self.frame_delivered(batch),
        }
        !self.torn_down
    }

    pub fn become_visible(&mut self) {
        if self.torn_down {
            return;
        }
        if self.session.as_ref().is_some_and(|s| s.state().is_running()) {
            tracing::debug!("Already scanning, ignoring visibility signal");
            return;
        }

        self.is_visible = true;
        self.state.set_visible(true);

        if self.permission_pending {
            tracing::debug!("Camera permission request still pending");
            return;
        }

        self.activation += 1;
        self.state.begin_activation(self.activation);

        let authorization = self.gate.check();
        self.state.set_authorization(authorization);
        tracing::info!(
            "Activation {} started, camera authorization {:?}",
            self.activation,
            authorization
        );

        match authorization {
            AuthorizationState::Authorized => self.activate(),
            AuthorizationState::Denied | AuthorizationState::Restricted => {
                self.fail(FailureReason::PermissionDenied)
            }
            AuthorizationState::Unknown => self.request_permission(),
        }
    }

    fn request_permission(&mut self) {
        self.permission_pending = true;
        self.metrics.record_permission_request();

        let gate = Arc::clone(&self.gate);
        let mailbox = self.mailbox.clone();
        let activation = self.activation;
        tokio::spawn(async move {
            let state = gate.request().await;
            // The scanner may already be gone; nothing to report to then.
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(ControlMessage::PermissionResolved { activation, state });
            }
        });
    }

    pub fn permission_resolved(&mut self, activation: u64, authorization: AuthorizationState) {
        if activation != self.activation || !self.permission_pending {
            tracing::debug!("Ignoring permission outcome for activation {}", activation);
            return;
        }
        self.permission_pending = false;
        self.state.set_authorization(authorization);

        if self.torn_down || !self.is_visible {
            tracing::info!("Screen left while permission was pending, not starting capture");
            return;
        }

        match authorization {
            AuthorizationState::Authorized => self.activate(),
            _ => self.fail(FailureReason::PermissionDenied),
        }
    }

    fn activate(&mut self) {
        if self.viewport.is_empty() {
            tracing::warn!(
                "Viewport size not reported yet, activation {} waits for it",
                self.activation
            );
            self.awaiting_viewport = true;
            return;
        }
        self.awaiting_viewport = false;

        let region = RegionOfInterest::new(
            self.viewport,
            self.settings.hole_side,
            self.settings.corner_radius,
        );
        let config = self.settings.capture_config();
        self.state.set_scan_window(region.mask(self.settings.mask_opacity));

        self.state.set_session_state(SessionState::Configuring);
        let mut session =
            CaptureSession::new(self.activation, self.frame_consumer(), Arc::clone(&self.metrics));

        let started = session
            .configure(self.provider.as_ref(), &config, &region)
            .and_then(|()| session.start());

        match started {
            Ok(()) => {
                self.pipeline = Some(DecodePipeline::new(&config));
                self.session = Some(session);
                self.state.set_session_state(SessionState::Running);
            }
            Err(e) => {
                drop(session);
                self.fail_with(&e);
            }
        }
    }

    /// Frames are re-posted into the mailbox so decoding happens here, on
    /// the controlling context, never on the capture thread.
    fn frame_consumer(&self) -> FrameConsumer {
        let mailbox = self.mailbox.clone();
        Arc::new(move |batch| {
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(ControlMessage::Frame(batch));
            }
        })
    }

    pub fn frame_delivered(&mut self, batch: FrameBatch) {
        let live = !self.torn_down
            && batch.activation == self.activation
            && self.session.as_ref().is_some_and(|s| s.state().is_running());
        if !live {
            self.metrics.record_stale_frame();
            tracing::trace!("Dropping frame from activation {}", batch.activation);
            return;
        }

        let (Some(session), Some(pipeline)) = (self.session.as_mut(), self.pipeline.as_mut())
        else {
            return;
        };
        self.metrics.record_frame_delivered();

        match pipeline.consume(session, &batch.objects) {
            FrameOutcome::Matched(result) => {
                self.metrics.record_decoded();
                self.release_session();
                tracing::info!(
                    "Decoded {} code ({} bytes) on activation {}",
                    result.symbology,
                    result.raw_string.len(),
                    self.activation
                );
                self.state.record_decoded(result);
                if self.settings.confirmation_feedback {
                    self.state.request_confirmation();
                }
            }
            FrameOutcome::Ignored => {
                self.metrics.record_frame_ignored();
                tracing::trace!("No readable code in frame");
            }
            FrameOutcome::AlreadyMatched => self.metrics.record_stale_frame(),
        }
    }

    pub fn become_invisible(&mut self) {
        if self.torn_down {
            return;
        }
        self.is_visible = false;
        self.awaiting_viewport = false;
        self.state.set_visible(false);

        if self.release_session() {
            tracing::info!("Screen hidden, capture session {} released", self.activation);
            self.state.set_session_state(SessionState::Stopped);
        }
    }

    pub fn viewport_size_changed(&mut self, width: f64, height: f64) {
        self.viewport = Size::new(width, height).sanitized();
        self.state.set_viewport(self.viewport);
        tracing::debug!(
            "Viewport now {}x{}, applies from the next activation",
            self.viewport.width,
            self.viewport.height
        );

        if self.awaiting_viewport && self.is_visible && !self.torn_down {
            self.activate();
        }
    }

    /// Terminal teardown. Releases any held session regardless of state.
    pub fn teardown(&mut self, dismissed: bool) {
        if self.torn_down {
            return;
        }
        if self.release_session() {
            self.state.set_session_state(SessionState::Stopped);
        }
        self.torn_down = true;
        self.is_visible = false;
        self.state.mark_torn_down(dismissed);
        tracing::info!("Scanner torn down (dismissed: {})", dismissed);
    }

    /// Stop and drop the current session. Returns whether one was held.
    fn release_session(&mut self) -> bool {
        self.pipeline = None;
        match self.session.take() {
            Some(mut session) => {
                session.teardown();
                true
            }
            None => false,
        }
    }

    fn fail_with(&mut self, error: &CaptureError) {
        tracing::warn!("Capture setup failed: {}", error);
        self.fail(error.failure_reason());
    }

    fn fail(&mut self, reason: FailureReason) {
        self.release_session();
        self.metrics.record_failure();
        tracing::warn!("Activation {} failed: {}", self.activation, reason);
        self.state.record_failure(reason);
    }
}
