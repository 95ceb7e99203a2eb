//! HTTP client for the hosted auth + table service.
//!
//! Thin `reqwest` wrapper over the `/auth/v1` and `/rest/v1` endpoints.
//! Error payload parsing is pure (`parse_error`) for testability.
//!
//! SESSION HANDLING
//! ================
//! The handle owns the session tokens, not the auth store. Tokens live in
//! memory and, when a session path is configured, in a small JSON file so a
//! later process can reuse the session. Sign-in, sign-up with an issued
//! session and sign-out broadcast an [`AuthEvent`] to subscribers.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::*;
use super::{Backend, BackendError};
use crate::config::BackendConfig;

const AUTH_EVENT_CAPACITY: usize = 16;
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const MEMBER_SELECT: &str =
    "user_id,project_id,role,joined_at,profile:profiles(id,name,email,avatar_url),project:projects(id,name,owner_id)";

// =============================================================================
// CLIENT
// =============================================================================

pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Mutex<Option<Session>>,
    session_path: Option<PathBuf>,
    events: broadcast::Sender<AuthEvent>,
}

impl RestBackend {
    /// Build the client and restore a saved session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        let session = config.session_path.as_deref().and_then(load_session);
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url: config.url,
            anon_key: config.anon_key,
            session: Mutex::new(session),
            session_path: config.session_path,
            events,
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn access_token(&self) -> Option<String> {
        self.session
            .lock()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.access_token.clone()))
    }

    /// Request with `apikey` and the session bearer (anon key when signed out).
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.anon_key.clone());
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn store_session(&self, session: Option<Session>) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = session.clone();
        }
        let Some(path) = &self.session_path else {
            return;
        };
        let result = match &session {
            Some(session) => match serde_json::to_vec(session) {
                Ok(bytes) => tokio::fs::write(path, bytes).await,
                Err(e) => {
                    warn!(error = %e, "session serialize failed");
                    return;
                }
            },
            None => match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "session file update failed");
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn load_session(path: &Path) -> Option<Session> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "ignoring unreadable session file");
            None
        }
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: &'a UserMetadata,
}

/// Sign-up answers with a session when no confirmation is pending, else a bare user.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(Session),
    User(SessionUser),
}

#[derive(Deserialize)]
struct ProjectIdRow {
    project_id: Uuid,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Map an error response from either endpoint family into a [`BackendError`].
///
/// Auth errors carry `error_code` + `msg` (or the older `error` +
/// `error_description`); table errors carry a string `code` + `message`.
pub(crate) fn parse_error(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error_code.or_else(|| match parsed.code {
        Some(serde_json::Value::String(code)) => Some(code),
        _ => None,
    });
    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() { format!("HTTP {status}") } else { body.to_owned() }
        });
    BackendError::Api { status, code, message }
}

fn parse_sign_up(body: &str) -> Result<(SessionUser, Option<Session>), BackendError> {
    match serde_json::from_str::<SignUpResponse>(body) {
        Ok(SignUpResponse::Session(session)) => Ok((session.user.clone(), Some(session))),
        Ok(SignUpResponse::User(user)) => Ok((user, None)),
        Err(e) => Err(BackendError::Parse(e.to_string())),
    }
}

pub(crate) fn eq_filter(id: Uuid) -> String {
    format!("eq.{id}")
}

pub(crate) fn in_filter(ids: &[Uuid]) -> String {
    let joined = ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
    format!("in.({joined})")
}

async fn send_text(builder: RequestBuilder) -> Result<(u16, String), BackendError> {
    let response = builder
        .send()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;
    Ok((status, text))
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, BackendError> {
    let (status, text) = send_text(builder).await?;
    if !(200..300).contains(&status) {
        return Err(parse_error(status, &text));
    }
    serde_json::from_str(&text).map_err(|e| BackendError::Parse(e.to_string()))
}

async fn send_empty(builder: RequestBuilder) -> Result<(), BackendError> {
    let (status, text) = send_text(builder).await?;
    if !(200..300).contains(&status) {
        return Err(parse_error(status, &text));
    }
    Ok(())
}

// =============================================================================
// BACKEND IMPL
// =============================================================================

#[async_trait::async_trait]
impl Backend for RestBackend {
    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<SessionUser, BackendError> {
        let builder = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(credentials);
        let session: Session = send_json(builder).await?;
        let user = session.user.clone();
        self.store_session(Some(session.clone())).await;
        debug!(user_id = %user.id, "password sign-in succeeded");
        self.emit(AuthEvent::signed_in(session));
        Ok(user)
    }

    async fn sign_up(&self, request: &SignUp) -> Result<SessionUser, BackendError> {
        let body = SignUpBody { email: &request.email, password: &request.password, data: &request.metadata };
        let builder = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&body);
        let (status, text) = send_text(builder).await?;
        if !(200..300).contains(&status) {
            return Err(parse_error(status, &text));
        }
        let (user, session) = parse_sign_up(&text)?;
        if let Some(session) = session {
            self.store_session(Some(session.clone())).await;
            self.emit(AuthEvent::signed_in(session));
        }
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.access_token().is_some() {
            let builder = self.request(Method::POST, &self.auth_url("logout"));
            let (status, text) = send_text(builder).await?;
            // An already-invalid session is still a completed sign-out.
            let already_gone = [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN, StatusCode::NOT_FOUND]
                .iter()
                .any(|s| s.as_u16() == status);
            if !(200..300).contains(&status) && !already_gone {
                return Err(parse_error(status, &text));
            }
        }
        self.store_session(None).await;
        self.emit(AuthEvent::signed_out());
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<SessionUser>, BackendError> {
        if self.access_token().is_none() {
            return Ok(None);
        }
        let builder = self.request(Method::GET, &self.auth_url("user"));
        let (status, text) = send_text(builder).await?;
        match status {
            200..=299 => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| BackendError::Parse(e.to_string())),
            401 | 403 => Ok(None),
            _ => Err(parse_error(status, &text)),
        }
    }

    fn subscribe_auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn get_profile(&self, id: Uuid) -> Result<Profile, BackendError> {
        let builder = self
            .request(Method::GET, &self.table_url("profiles"))
            .query(&[("select", "*"), ("id", eq_filter(id).as_str())])
            .header("Accept", SINGLE_OBJECT);
        send_json(builder).await
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), BackendError> {
        let builder = self
            .request(Method::POST, &self.table_url("profiles"))
            .header("Prefer", "return=minimal")
            .json(profile);
        send_empty(builder).await
    }

    async fn list_member_project_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, BackendError> {
        let builder = self
            .request(Method::GET, &self.table_url("project_members"))
            .query(&[("select", "project_id"), ("user_id", eq_filter(user_id).as_str())]);
        let rows: Vec<ProjectIdRow> = send_json(builder).await?;
        Ok(rows.into_iter().map(|r| r.project_id).collect())
    }

    async fn list_project_members(&self, project_ids: &[Uuid]) -> Result<Vec<MembershipRow>, BackendError> {
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let builder = self
            .request(Method::GET, &self.table_url("project_members"))
            .query(&[("select", MEMBER_SELECT), ("project_id", in_filter(project_ids).as_str())]);
        send_json(builder).await
    }

    async fn list_projects(&self, ids: &[Uuid]) -> Result<Vec<Project>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let builder = self
            .request(Method::GET, &self.table_url("projects"))
            .query(&[("select", "*"), ("id", in_filter(ids).as_str()), ("order", "created_at.desc")]);
        send_json(builder).await
    }

    async fn insert_project(&self, project: &NewProject) -> Result<Project, BackendError> {
        let builder = self
            .request(Method::POST, &self.table_url("projects"))
            .header("Prefer", "return=representation")
            .header("Accept", SINGLE_OBJECT)
            .json(project);
        send_json(builder).await
    }

    async fn insert_membership(&self, membership: &NewMembership) -> Result<(), BackendError> {
        let builder = self
            .request(Method::POST, &self.table_url("project_members"))
            .header("Prefer", "return=minimal")
            .json(membership);
        send_empty(builder).await
    }

    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, BackendError> {
        let builder = self
            .request(Method::GET, &self.table_url("tasks"))
            .query(&[
                ("select", "*"),
                ("project_id", eq_filter(project_id).as_str()),
                ("order", "created_at.asc"),
            ]);
        send_json(builder).await
    }

    async fn insert_task(&self, task: &NewTask) -> Result<Task, BackendError> {
        let builder = self
            .request(Method::POST, &self.table_url("tasks"))
            .header("Prefer", "return=representation")
            .header("Accept", SINGLE_OBJECT)
            .json(task);
        send_json(builder).await
    }

    async fn update_task(&self, id: Uuid, patch: &TaskPatch) -> Result<Task, BackendError> {
        let builder = self
            .request(Method::PATCH, &self.table_url("tasks"))
            .query(&[("id", eq_filter(id).as_str())])
            .header("Prefer", "return=representation")
            .header("Accept", SINGLE_OBJECT)
            .json(patch);
        send_json(builder).await
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), BackendError> {
        let builder = self
            .request(Method::DELETE, &self.table_url("tasks"))
            .query(&[("id", eq_filter(id).as_str())])
            .header("Prefer", "return=minimal");
        send_empty(builder).await
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
