//! Domain services driven by the CLI (or any other front end).
//!
//! ARCHITECTURE
//! ============
//! Service modules own the behavior behind each user action so the front end
//! only translates input and renders the resulting state.

pub mod auth;
pub mod listener;
pub mod persistence;
pub mod projects;
pub mod team;
