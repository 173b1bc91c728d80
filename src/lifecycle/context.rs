// Controlling context - the single task that owns the scanner
//
// UI signals, permission outcomes and frame batches all go through one
// mailbox and are handled one at a time on one tokio task. That task is the
// only place scanner state changes or events are emitted, so the lifecycle
// itself needs no locking.

use super::controller::{ControlChannel, ControlMessage, ScannerLifecycle};
use crate::models::ScannerState;
use crate::state::{StateChange, StateManager};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Cloneable handle the presentation layer uses to drive the scanner
///
/// Every method only enqueues a message; none blocks. Sends fail (return
/// `false`) once the scanner task has finished. Dropping the last handle
/// tears the scanner down as [`shutdown`](Self::shutdown) does.
#[derive(Clone)]
pub struct ScannerHandle {
    mailbox: mpsc::UnboundedSender<ControlMessage>,
    state: StateManager,
}

impl ScannerHandle {
    pub fn become_visible(&self) -> bool {
        self.send(ControlMessage::BecomeVisible)
    }

    pub fn become_invisible(&self) -> bool {
        self.send(ControlMessage::BecomeInvisible)
    }

    pub fn viewport_size_changed(&self, width: f64, height: f64) -> bool {
        self.send(ControlMessage::ViewportSizeChanged { width, height })
    }

    /// Tear the scanner down and signal dismissal
    pub fn user_cancelled(&self) -> bool {
        self.send(ControlMessage::UserCancelled)
    }

    /// Tear the scanner down without dismissal (screen destroyed)
    pub fn shutdown(&self) -> bool {
        self.send(ControlMessage::Shutdown)
    }

    /// Outbound events: `Decoded`, `Failure` and state diffs
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ScannerState {
        self.state.snapshot()
    }

    fn send(&self, message: ControlMessage) -> bool {
        self.mailbox.send(message).is_ok()
    }
}

/// Run `lifecycle` on its own task and return a handle to it
///
/// The task ends after `UserCancelled`, `Shutdown` or once every handle is
/// dropped. Any camera the lifecycle still holds is released before it ends.
pub fn spawn_scanner(
    lifecycle: ScannerLifecycle,
    channel: ControlChannel,
) -> (ScannerHandle, JoinHandle<()>) {
    let ControlChannel { sender, receiver } = channel;
    let handle = ScannerHandle {
        mailbox: sender,
        state: lifecycle.state().clone(),
    };
    let task = tokio::spawn(run(lifecycle, receiver));
    (handle, task)
}

async fn run(mut lifecycle: ScannerLifecycle, mut mailbox: mpsc::UnboundedReceiver<ControlMessage>) {
    tracing::debug!("Scanner control loop started");

    while let Some(message) = mailbox.recv().await {
        if !lifecycle.handle(message) {
            break;
        }
    }

    lifecycle.teardown(false);
    tracing::debug!("Scanner control loop finished");
}
