//! Client-side auth and team state for a hosted task board.
//!
//! ARCHITECTURE
//! ============
//! - [`backend`]: the hosted service behind the [`backend::Backend`] trait.
//! - [`state`]: the shared [`state::AuthStore`] and the [`state::AppState`] handle.
//! - [`services`]: login/signup/logout, the auth-change listener, the
//!   persisted auth blob, the team roster and project/task calls.
//! - [`config`]: environment-driven settings.

pub mod backend;
pub mod config;
pub mod services;
pub mod state;
