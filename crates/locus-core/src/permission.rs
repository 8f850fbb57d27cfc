//! Location authorization state and the consent flow.
//!
//! The gate starts in a configured state (normally `notDetermined`) and only
//! moves when asked to:
//! - [`PermissionGate::request`] runs the external consent flow once, moving
//!   `notDetermined` to `authorized` or `denied`. Later requests return the
//!   settled state without prompting again.
//! - [`PermissionGate::revoke`] records the platform withdrawing consent.
//!
//! State changes are broadcast on a `tokio::sync::watch` channel so the
//! sampling engine can stop as soon as access is lost.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use utoipa::ToSchema;

/// Authorization to read the device location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationState {
    /// The user has not been asked yet.
    NotDetermined,
    /// The user refused, or access was revoked.
    Denied,
    /// Sampling may run.
    Authorized,
}

impl AuthorizationState {
    /// Returns `true` for [`AuthorizationState::Authorized`].
    #[must_use]
    pub const fn is_authorized(self) -> bool {
        matches!(self, Self::Authorized)
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDetermined => write!(f, "notDetermined"),
            Self::Denied => write!(f, "denied"),
            Self::Authorized => write!(f, "authorized"),
        }
    }
}

/// The platform's consent dialog.
///
/// Implementations suspend until the user answers and return either
/// `Authorized` or `Denied`.
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    /// Ask the user for location access.
    async fn prompt(&self) -> AuthorizationState;
}

/// Consent flow that always answers the same way.
#[derive(Debug, Clone, Copy)]
pub struct StaticConsent(pub AuthorizationState);

#[async_trait]
impl ConsentPrompt for StaticConsent {
    async fn prompt(&self) -> AuthorizationState {
        self.0
    }
}

/// Tracks authorization state and serializes consent requests.
pub struct PermissionGate {
    state: watch::Sender<AuthorizationState>,
    consent: Arc<dyn ConsentPrompt>,
    request_lock: Mutex<()>,
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate")
            .field("state", &self.check())
            .finish_non_exhaustive()
    }
}

impl PermissionGate {
    /// Create a gate in `initial` state that asks `consent` when requested.
    pub fn new(initial: AuthorizationState, consent: Arc<dyn ConsentPrompt>) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            consent,
            request_lock: Mutex::new(()),
        }
    }

    /// Current state, without side effects.
    #[must_use]
    pub fn check(&self) -> AuthorizationState {
        *self.state.borrow()
    }

    /// Run the consent flow if the state is still undetermined.
    ///
    /// Concurrent callers wait for the same flow; at most one prompt is shown.
    pub async fn request(&self) -> AuthorizationState {
        let _guard = self.request_lock.lock().await;

        let current = self.check();
        if current != AuthorizationState::NotDetermined {
            return current;
        }

        let answer = match self.consent.prompt().await {
            AuthorizationState::NotDetermined => {
                warn!("Consent flow returned without an answer, treating as denied");
                AuthorizationState::Denied
            }
            settled => settled,
        };

        self.state.send_replace(answer);
        info!(state = %answer, "Location authorization settled");
        answer
    }

    /// Record that the platform withdrew location access.
    ///
    /// A running sampling loop observes the change and stops.
    pub fn revoke(&self) {
        let previous = self.state.send_replace(AuthorizationState::Denied);
        if previous != AuthorizationState::Denied {
            info!(previous = %previous, "Location authorization revoked");
        }
    }

    /// Watch state changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthorizationState> {
        self.state.subscribe()
    }
}
