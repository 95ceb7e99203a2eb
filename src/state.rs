//! Shared application state.
//!
//! DESIGN
//! ======
//! `AuthStore` is the single container for the signed-in identity. It wraps a
//! `tokio::sync::watch` channel so UI code, the auth listener and the
//! persistence task can all observe the same value. `AppState` bundles the
//! store with the backend handle and is passed by clone to every service.
//!
//! WRITE ORDERING
//! ==============
//! Operations race: a user can double-submit a login, and the auth listener
//! writes independently of manual calls. Each operation therefore takes a
//! monotonic [`Ticket`] when it starts and tags its writes with it. Staleness
//! is tracked per field group:
//! - identity (`user`) writes go through [`AuthStore::apply`] and are dropped
//!   when an older ticket arrives after a newer one
//! - `error` writes go through [`AuthStore::set_error`] with their own stamp,
//!   so an identity change never swallows an operation's failure
//! - profile writes and [`AuthStore::clear_error`] go through
//!   [`AuthStore::update`]; they are gated by the caller on the user id and
//!   never advance a stamp
//!
//! `is_loading` is not ticket-gated: it is driven by an in-flight counter held
//! through [`OperationGuard`], which resets the flag on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{Backend, Profile, SessionUser};
use crate::config::ProfileWaitConfig;

// =============================================================================
// AUTH STATE
// =============================================================================

/// Snapshot of the auth store.
///
/// Invariant: `profile` is `Some` only while `user` is `Some`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<SessionUser>,
    pub profile: Option<Profile>,
    /// `true` while at least one login/signup is in flight.
    pub is_loading: bool,
    /// User-facing error from the last auth operation.
    pub error: Option<String>,
    /// Lower-severity channel for profile fetch/create failures. Never blocks a session.
    pub profile_error: Option<String>,
    /// Ticket of the operation that last wrote the identity.
    pub version: u64,
    /// Ticket of the operation that last wrote `error`.
    pub error_version: u64,
}

impl AuthState {
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// The subset of [`AuthState`] that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAuth {
    #[serde(default)]
    pub user: Option<SessionUser>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

impl From<&AuthState> for PersistedAuth {
    fn from(state: &AuthState) -> Self {
        Self { user: state.user.clone(), profile: state.profile.clone() }
    }
}

// =============================================================================
// AUTH STORE
// =============================================================================

/// Monotonic stamp taken by an operation when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

struct StoreInner {
    state: watch::Sender<AuthState>,
    next_ticket: AtomicU64,
    in_flight: AtomicUsize,
}

/// Cloneable handle to the shared auth state.
#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<StoreInner>,
}

impl AuthStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(AuthState::default())
    }

    /// Rebuild the store from a persisted blob. Loading and error flags start fresh.
    #[must_use]
    pub fn rehydrate(persisted: PersistedAuth) -> Self {
        let PersistedAuth { user, profile } = persisted;
        // EDGE: a profile that does not belong to the persisted user is dropped.
        let profile = match (&user, profile) {
            (Some(user), Some(profile)) if profile.id == user.id => Some(profile),
            _ => None,
        };
        Self::with_state(AuthState { user, profile, ..AuthState::default() })
    }

    fn with_state(state: AuthState) -> Self {
        let next = state.version.max(state.error_version) + 1;
        let (tx, _rx) = watch::channel(state);
        Self {
            inner: Arc::new(StoreInner {
                state: tx,
                next_ticket: AtomicU64::new(next),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Current state, cloned.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Observe every accepted change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn persisted(&self) -> PersistedAuth {
        PersistedAuth::from(&*self.inner.state.borrow())
    }

    /// Take the next ticket. Later tickets win over earlier ones.
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        Ticket(self.inner.next_ticket.fetch_add(1, Ordering::SeqCst))
    }

    /// Apply an identity write if `ticket` is not older than the last accepted one.
    ///
    /// Returns `false` when the write was dropped as stale.
    pub fn apply<F>(&self, ticket: Ticket, f: F) -> bool
    where
        F: FnOnce(&mut AuthState),
    {
        let mut applied = false;
        self.inner.state.send_if_modified(|state| {
            if ticket.0 < state.version {
                debug!(ticket = ticket.0, version = state.version, "dropping stale auth state write");
                return false;
            }
            state.version = ticket.0;
            f(state);
            if state.user.is_none() {
                state.profile = None;
            }
            applied = true;
            true
        });
        applied
    }

    /// Mark an operation in flight until the returned guard drops.
    #[must_use]
    pub fn begin_operation(&self) -> OperationGuard {
        let inner = Arc::clone(&self.inner);
        inner.state.send_modify(|state| {
            inner.in_flight.fetch_add(1, Ordering::SeqCst);
            state.is_loading = true;
        });
        OperationGuard { inner }
    }

    /// Write `error` unless a newer operation already reported its outcome.
    ///
    /// Returns `false` when the write was dropped as stale.
    pub fn set_error(&self, ticket: Ticket, error: Option<String>) -> bool {
        let mut applied = false;
        self.inner.state.send_if_modified(|state| {
            if ticket.0 < state.error_version {
                debug!(ticket = ticket.0, version = state.error_version, "dropping stale auth error write");
                return false;
            }
            state.error_version = ticket.0;
            state.error = error;
            applied = true;
            true
        });
        applied
    }

    /// Unstamped write. Callers check that the state still matches what they expect.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut AuthState),
    {
        self.inner.state.send_modify(|state| {
            f(state);
            if state.user.is_none() {
                state.profile = None;
            }
        });
    }

    /// Reset `error`. Pure state transition; in-flight operations keep their stamps.
    pub fn clear_error(&self) {
        self.update(|state| state.error = None);
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps `is_loading` set while alive.
pub struct OperationGuard {
    inner: Arc<StoreInner>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let inner = &self.inner;
        // Counter and flag change together under the channel lock.
        inner.state.send_modify(|state| {
            let remaining = inner.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            state.is_loading = remaining > 0;
        });
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Everything a service call needs: the backend handle and the auth store.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub auth: AuthStore,
    pub profile_wait: ProfileWaitConfig,
}

impl AppState {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, auth: AuthStore, profile_wait: ProfileWaitConfig) -> Self {
        Self { backend, auth, profile_wait }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
