//! Backend client handle: auth, table queries and session notifications.
//!
//! DESIGN
//! ======
//! Everything the store needs from the hosted service sits behind the
//! [`Backend`] trait so services can run against the HTTP client in
//! production and a scripted mock in tests. `RestBackend` speaks the
//! service's auth (`/auth/v1`) and table (`/rest/v1`) dialects.

pub mod rest;
pub mod types;

pub use rest::RestBackend;
pub use types::*;

use tokio::sync::broadcast;
use uuid::Uuid;

/// Error code the table endpoint returns when a single-row read finds nothing.
pub const NOT_FOUND_CODE: &str = "PGRST116";

/// Error code the table endpoint returns when an insert hits an existing key.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Error code the auth endpoint returns for a sign-in on an unconfirmed email.
pub const EMAIL_NOT_CONFIRMED_CODE: &str = "email_not_confirmed";

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by backend calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The service answered with an error payload. `message` is shown verbatim.
    #[error("{message}")]
    Api { status: u16, code: Option<String>, message: String },

    /// The HTTP request itself failed.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be deserialized.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The call needs a signed-in session and there is none.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl BackendError {
    /// A single-row read that matched no rows.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Api { status: 406, code: Some(NOT_FOUND_CODE.to_owned()), message: message.into() }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { code: Some(code), .. } if code == NOT_FOUND_CODE)
    }

    /// An insert rejected because the row already exists.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
            || matches!(self, Self::Api { code: Some(code), .. } if code == UNIQUE_VIOLATION_CODE)
    }

    /// Sign-in rejected only because the email is not yet confirmed.
    #[must_use]
    pub fn is_email_not_confirmed(&self) -> bool {
        match self {
            Self::Api { code, message, .. } => {
                code.as_deref() == Some(EMAIL_NOT_CONFIRMED_CODE)
                    || message.to_ascii_lowercase().contains("email not confirmed")
            }
            _ => false,
        }
    }
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

/// Async handle to the hosted service. Enables mocking in tests.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Password sign-in.
    ///
    /// # Errors
    ///
    /// Returns the service's error, e.g. invalid credentials or unconfirmed email.
    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<SessionUser, BackendError>;

    /// Create an identity. No confirmation redirect is configured.
    ///
    /// # Errors
    ///
    /// Returns the service's error, e.g. an already registered email.
    async fn sign_up(&self, request: &SignUp) -> Result<SessionUser, BackendError>;

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects the sign-out.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Identity behind the current session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for reasons other than a missing session.
    async fn get_user(&self) -> Result<Option<SessionUser>, BackendError>;

    /// Subscribe to session changes. Each receiver sees every later event.
    fn subscribe_auth_events(&self) -> broadcast::Receiver<AuthEvent>;

    /// Read one `profiles` row. A missing row is reported via [`BackendError::is_not_found`].
    ///
    /// # Errors
    ///
    /// Returns an error if the row is absent or the request fails.
    async fn get_profile(&self, id: Uuid) -> Result<Profile, BackendError>;

    /// Insert one `profiles` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert is rejected.
    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), BackendError>;

    /// Ids of every project the user is a member of.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn list_member_project_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, BackendError>;

    /// Membership rows for the given projects, joined with member profile and project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn list_project_members(&self, project_ids: &[Uuid]) -> Result<Vec<MembershipRow>, BackendError>;

    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn list_projects(&self, ids: &[Uuid]) -> Result<Vec<Project>, BackendError>;

    /// # Errors
    ///
    /// Returns an error if the insert is rejected.
    async fn insert_project(&self, project: &NewProject) -> Result<Project, BackendError>;

    /// # Errors
    ///
    /// Returns an error if the insert is rejected.
    async fn insert_membership(&self, membership: &NewMembership) -> Result<(), BackendError>;

    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, BackendError>;

    /// # Errors
    ///
    /// Returns an error if the insert is rejected.
    async fn insert_task(&self, task: &NewTask) -> Result<Task, BackendError>;

    /// # Errors
    ///
    /// Returns an error if the task is absent or the update is rejected.
    async fn update_task(&self, id: Uuid, patch: &TaskPatch) -> Result<Task, BackendError>;

    /// # Errors
    ///
    /// Returns an error if the delete is rejected.
    async fn delete_task(&self, id: Uuid) -> Result<(), BackendError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
