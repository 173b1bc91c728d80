//! Camera permission gate.
//!
//! The platform owns the authorization decision and persists it for the
//! whole process. The gate only reads it and, when it is still undecided,
//! asks once. Concurrent callers that arrive while the dialog is open all
//! await the same outcome instead of opening a second dialog.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OnceCell, oneshot};

use crate::models::AuthorizationState;

/// Platform access to the camera authorization status.
///
/// `request_access` mirrors a completion-handler API: the platform shows its
/// dialog and later answers on the returned channel, from any thread.
/// Dropping the sender without answering means the request was abandoned.
#[cfg_attr(test, mockall::automock)]
pub trait AuthorizationProvider: Send + Sync {
    fn authorization_status(&self) -> AuthorizationState;

    fn request_access(&self) -> oneshot::Receiver<bool>;
}

pub struct PermissionGate {
    provider: Arc<dyn AuthorizationProvider>,
    /// Outcome of the one dialog this process shows.
    resolved: OnceCell<AuthorizationState>,
    requests_issued: AtomicUsize,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn AuthorizationProvider>) -> Self {
        Self {
            provider,
            resolved: OnceCell::new(),
            requests_issued: AtomicUsize::new(0),
        }
    }

    /// Current authorization, without prompting.
    pub fn check(&self) -> AuthorizationState {
        match self.resolved.get() {
            Some(state) => *state,
            None => self.provider.authorization_status(),
        }
    }

    /// Resolve the authorization, prompting the user if it is still unknown.
    ///
    /// Returns immediately for an already decided status. An abandoned
    /// request resolves to [`AuthorizationState::Denied`] for this caller but
    /// is not remembered, so a later call may prompt again.
    pub async fn request(&self) -> AuthorizationState {
        let current = self.check();
        if current != AuthorizationState::Unknown {
            return current;
        }

        let outcome = self
            .resolved
            .get_or_try_init(|| async {
                self.requests_issued.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Requesting camera access");

                let granted = self.provider.request_access().await?;
                Ok::<_, oneshot::error::RecvError>(if granted {
                    AuthorizationState::Authorized
                } else {
                    AuthorizationState::Denied
                })
            })
            .await;

        match outcome {
            Ok(state) => {
                tracing::info!("Camera access resolved: {:?}", state);
                *state
            }
            Err(_) => {
                tracing::warn!("Camera access request was abandoned by the platform");
                AuthorizationState::Denied
            }
        }
    }

    /// Number of permission dialogs this gate has asked the platform for.
    pub fn requests_issued(&self) -> usize {
        self.requests_issued.load(Ordering::Relaxed)
    }
}
