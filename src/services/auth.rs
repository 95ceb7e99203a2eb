//! Auth store operations: login, signup, logout and profile bootstrap.
//!
//! ARCHITECTURE
//! ============
//! Every operation takes a ticket when it starts. Identity writes go through
//! [`AuthStore::apply`] and `error` writes through [`AuthStore::set_error`], so
//! a slow response cannot overwrite newer state of the same kind. Profile
//! writes are not ticketed: a profile read for the signed-in user id is always
//! stored. None of the operations return an error: failures land in `error`
//! (user-facing) or `profile_error` (profile bootstrap) and in the log.
//!
//! RECOVERY
//! ========
//! - A sign-in rejected only because the email is unconfirmed is treated as a
//!   success when the backend can still resolve the user.
//! - A missing `profiles` row is created from identity data. A duplicate-key
//!   rejection means another caller created it first, so we read it back.
//! - After sign-up the backend trigger usually creates the profile row; we
//!   poll for it with bounded backoff before inserting it ourselves.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, Credentials, NewProfile, Profile, SessionUser, SignUp, UserMetadata};
use crate::state::{AppState, AuthState, AuthStore};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignupError {
    #[error("Name is required")]
    NameRequired,
    #[error("Email is required")]
    EmailRequired,
    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },
}

/// Trim and lowercase an email before it reaches the backend.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Check sign-up input before any backend call.
///
/// # Errors
///
/// Returns the first failing rule: name, then email, then password length.
pub fn validate_signup(name: &str, email: &str, password: &str) -> Result<(), SignupError> {
    if name.trim().is_empty() {
        return Err(SignupError::NameRequired);
    }
    if email.trim().is_empty() {
        return Err(SignupError::EmailRequired);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(SignupError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }
    Ok(())
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Password sign-in. Ends with either a user and no error, or an error.
pub async fn login(state: &AppState, email: &str, password: &str) {
    let store = &state.auth;
    let ticket = store.ticket();
    let _guard = store.begin_operation();
    store.set_error(ticket, None);

    let credentials = Credentials { email: normalize_email(email), password: password.to_owned() };
    let user = match state.backend.sign_in_with_password(&credentials).await {
        Ok(user) => user,
        Err(e) if e.is_email_not_confirmed() => {
            if let Some(user) = resolve_unconfirmed(state).await {
                user
            } else {
                warn!(error = %e, "login: unconfirmed email and no user to recover");
                store.set_error(ticket, Some(e.to_string()));
                return;
            }
        }
        Err(e) => {
            warn!(error = %e, "login failed");
            store.set_error(ticket, Some(e.to_string()));
            return;
        }
    };

    if !store.apply(ticket, |s| set_user(s, &user)) {
        debug!(user_id = %user.id, "login: newer state already written");
        return;
    }
    info!(user_id = %user.id, "login succeeded");
    fetch_profile(state).await;
}

/// Create an identity, then make sure its profile row exists.
pub async fn signup(state: &AppState, name: &str, email: &str, password: &str) {
    let store = &state.auth;
    let ticket = store.ticket();
    if let Err(e) = validate_signup(name, email, password) {
        store.set_error(ticket, Some(e.to_string()));
        return;
    }

    let _guard = store.begin_operation();
    store.set_error(ticket, None);

    let name = name.trim();
    let request = SignUp {
        email: normalize_email(email),
        password: password.to_owned(),
        metadata: UserMetadata { name: Some(name.to_owned()), avatar_url: None },
    };
    let user = match state.backend.sign_up(&request).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "signup failed");
            store.set_error(ticket, Some(e.to_string()));
            return;
        }
    };

    if !store.apply(ticket, |s| set_user(s, &user)) {
        debug!(user_id = %user.id, "signup: newer state already written");
        return;
    }
    info!(user_id = %user.id, "signup succeeded");

    if !wait_for_profile_row(state, user.id).await {
        debug!(user_id = %user.id, "profile row not created by backend; inserting");
        match state.backend.insert_profile(&NewProfile::from_identity(&user, Some(name))).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => debug!(user_id = %user.id, "signup: profile row appeared late"),
            Err(e) => warn!(user_id = %user.id, error = %e, "signup: profile insert failed"),
        }
    }
    fetch_profile(state).await;
}

/// End the session. On failure only `error` changes.
pub async fn logout(state: &AppState) {
    let store = &state.auth;
    let ticket = store.ticket();
    match state.backend.sign_out().await {
        Ok(()) => {
            store.apply(ticket, |s| {
                s.user = None;
                s.profile = None;
                s.profile_error = None;
            });
            store.set_error(ticket, None);
            info!("logout succeeded");
        }
        Err(e) => {
            warn!(error = %e, "logout failed");
            store.set_error(ticket, Some(e.to_string()));
        }
    }
}

/// Load the current user's profile, creating the row when it is missing.
///
/// Failures go to `profile_error`; `error` is never touched. A failure never
/// replaces a profile already stored for the same user, and a later success
/// always clears it. Safe to run concurrently for the same user.
pub async fn fetch_profile(state: &AppState) {
    let store = &state.auth;
    let Some(user) = store.snapshot().user else {
        return;
    };

    match state.backend.get_profile(user.id).await {
        Ok(profile) => store_profile(store, user.id, profile),
        Err(e) if e.is_not_found() => create_missing_profile(state, &user).await,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "profile fetch failed");
            store_profile_error(store, user.id, &e);
        }
    }
}

/// Reset `error`.
pub fn clear_error(state: &AppState) {
    state.auth.clear_error();
}

// =============================================================================
// HELPERS
// =============================================================================

/// Store `user`, dropping a cached profile that belongs to someone else.
pub(crate) fn set_user(state: &mut AuthState, user: &SessionUser) {
    if state.user_id() != Some(user.id) {
        state.profile_error = None;
    }
    if state.profile.as_ref().is_some_and(|p| p.id != user.id) {
        state.profile = None;
    }
    state.user = Some(user.clone());
}

async fn resolve_unconfirmed(state: &AppState) -> Option<SessionUser> {
    match state.backend.get_user().await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "login: could not resolve user after unconfirmed email");
            None
        }
    }
}

async fn create_missing_profile(state: &AppState, user: &SessionUser) {
    let store = &state.auth;
    info!(user_id = %user.id, "profile missing; creating from identity");
    match state.backend.insert_profile(&NewProfile::from_identity(user, None)).await {
        Ok(()) => {}
        Err(e) if e.is_conflict() => debug!(user_id = %user.id, "profile row created concurrently"),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "profile create failed");
            store_profile_error(store, user.id, &e);
            return;
        }
    }
    match state.backend.get_profile(user.id).await {
        Ok(profile) => store_profile(store, user.id, profile),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "profile re-fetch failed");
            store_profile_error(store, user.id, &e);
        }
    }
}

fn store_profile(store: &AuthStore, user_id: Uuid, profile: Profile) {
    store.update(|s| {
        if s.user_id() == Some(user_id) {
            s.profile = Some(profile);
            s.profile_error = None;
        }
    });
}

fn store_profile_error(store: &AuthStore, user_id: Uuid, err: &BackendError) {
    store.update(|s| {
        if s.user_id() == Some(user_id) && s.profile.is_none() {
            s.profile_error = Some(err.to_string());
        }
    });
}

/// Poll for the profile row the backend creates on sign-up.
///
/// Returns `true` once the row is readable, `false` after the last attempt.
async fn wait_for_profile_row(state: &AppState, user_id: Uuid) -> bool {
    let config = state.profile_wait;
    let attempts = config.attempts.max(1);
    for attempt in 1..=attempts {
        match state.backend.get_profile(user_id).await {
            Ok(_) => return true,
            Err(e) if e.is_not_found() => {}
            Err(e) => debug!(user_id = %user_id, attempt, error = %e, "profile wait read failed"),
        }
        if attempt < attempts {
            let delay = with_jitter(config.delay_for(attempt));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
    false
}

/// Add up to 25% random jitter.
pub(crate) fn with_jitter(delay: Duration) -> Duration {
    let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 {
        return Duration::ZERO;
    }
    let extra = rand::rng().random_range(0..=ms / 4);
    Duration::from_millis(ms.saturating_add(extra))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
