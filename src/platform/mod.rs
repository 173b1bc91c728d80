//! Desktop collaborators for the scanner.
//!
//! Desktop platforms have no per-app camera permission dialog and no
//! metadata output, so this module supplies:
//!
//! - [`StaticAuthorization`]: a fixed authorization answer
//! - [`StillFrameProvider`]: a camera that replays image files as frames and
//!   decodes them in software with [`QrDetector`](crate::services::QrDetector)

pub mod still;

pub use still::{StillFrameCamera, StillFrameProvider};

use crate::models::AuthorizationState;
use crate::services::permission::AuthorizationProvider;
use tokio::sync::oneshot;

/// Authorization provider that always reports the same state.
///
/// An `Unknown` status answers a request with "granted".
#[derive(Debug, Clone, Copy)]
pub struct StaticAuthorization(pub AuthorizationState);

impl AuthorizationProvider for StaticAuthorization {
    fn authorization_status(&self) -> AuthorizationState {
        self.0
    }

    fn request_access(&self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(!self.0.is_refused());
        rx
    }
}
