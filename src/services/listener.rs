//! Auth-change listener: reconciles the store with out-of-band session changes.
//!
//! SYSTEM CONTEXT
//! ==============
//! The backend handle broadcasts a [`AuthEvent`] whenever its session changes,
//! including changes caused by our own login/logout calls. The listener runs
//! for the life of the process and takes a fresh ticket per event, so its
//! identity writes win over an operation that started before the event
//! arrived. It never touches `error`: an operation's failure is reported even
//! when the session changes underneath it.

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AuthEvent, AuthEventKind};
use crate::services::auth::{fetch_profile, set_user};
use crate::state::AppState;

/// Subscribe now and process events on a background task.
///
/// The subscription is taken before spawning so no event emitted after this
/// call returns can be missed.
pub fn spawn_auth_listener(state: AppState) -> JoinHandle<()> {
    let mut rx = state.backend.subscribe_auth_events();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => handle_event(&state, event).await,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "auth listener lagged; events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
        debug!("auth listener stopped");
    })
}

/// Apply one event to the store.
pub async fn handle_event(state: &AppState, event: AuthEvent) {
    match (event.kind, event.session) {
        (AuthEventKind::SignedIn, Some(session)) => {
            let user = session.user;
            let ticket = state.auth.ticket();
            state.auth.apply(ticket, |s| set_user(s, &user));
            info!(user_id = %user.id, "auth listener: signed in");
            fetch_profile(state).await;
        }
        (AuthEventKind::SignedOut, _) => {
            let ticket = state.auth.ticket();
            state.auth.apply(ticket, |s| {
                s.user = None;
                s.profile = None;
                s.profile_error = None;
            });
            info!("auth listener: signed out");
        }
        (kind, _) => debug!(?kind, "auth listener: event ignored"),
    }
}

#[cfg(test)]
#[path = "listener_test.rs"]
mod tests;
