use super::*;
use crate::backend::{EMAIL_NOT_CONFIRMED_CODE, NOT_FOUND_CODE};
use crate::config::Timeouts;

fn config(session_path: Option<PathBuf>) -> BackendConfig {
    BackendConfig {
        url: "http://127.0.0.1:9".into(),
        anon_key: "anon".into(),
        timeouts: Timeouts::default(),
        session_path,
    }
}

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("taskboard-{label}-{}.json", Uuid::new_v4()))
}

// =============================================================================
// parse_error
// =============================================================================

#[test]
fn parse_error_auth_unconfirmed_email() {
    let body = r#"{"code":400,"error_code":"email_not_confirmed","msg":"Email not confirmed"}"#;
    let err = parse_error(400, body);
    assert!(err.is_email_not_confirmed());
    match err {
        BackendError::Api { status, code, message } => {
            assert_eq!(status, 400);
            assert_eq!(code.as_deref(), Some(EMAIL_NOT_CONFIRMED_CODE));
            assert_eq!(message, "Email not confirmed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn parse_error_legacy_auth_shape() {
    let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
    let err = parse_error(400, body);
    assert_eq!(err.to_string(), "Invalid login credentials");
    assert!(!err.is_email_not_confirmed());
}

#[test]
fn parse_error_table_not_found() {
    let body = r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;
    let err = parse_error(406, body);
    assert!(err.is_not_found());
    assert!(matches!(err, BackendError::Api { code: Some(ref c), .. } if c == NOT_FOUND_CODE));
}

#[test]
fn parse_error_duplicate_key_is_conflict() {
    let body = r#"{"code":"23505","details":"Key (id)=(1) already exists.","hint":null,"message":"duplicate key value violates unique constraint \"profiles_pkey\""}"#;
    let err = parse_error(409, body);
    assert!(err.is_conflict());
    assert!(!err.is_not_found());
    assert!(err.to_string().starts_with("duplicate key value"));
}

#[test]
fn parse_error_plain_text_body() {
    let err = parse_error(502, "bad gateway");
    assert_eq!(err.to_string(), "bad gateway");
}

#[test]
fn parse_error_empty_body_uses_status() {
    let err = parse_error(500, "  ");
    assert_eq!(err.to_string(), "HTTP 500");
}

// =============================================================================
// parse_sign_up
// =============================================================================

#[test]
fn parse_sign_up_with_session() {
    let body = r#"{"access_token":"at","refresh_token":"rt","token_type":"bearer","user":{"id":"00000000-0000-0000-0000-000000000001","email":"jane@x.com","user_metadata":{"name":"Jane"}}}"#;
    let (user, session) = parse_sign_up(body).unwrap();
    assert_eq!(user.email.as_deref(), Some("jane@x.com"));
    assert_eq!(session.unwrap().access_token, "at");
}

#[test]
fn parse_sign_up_bare_user() {
    let body = r#"{"id":"00000000-0000-0000-0000-000000000001","email":"jane@x.com","user_metadata":{}}"#;
    let (user, session) = parse_sign_up(body).unwrap();
    assert_eq!(user.id.to_string(), "00000000-0000-0000-0000-000000000001");
    assert!(session.is_none());
}

#[test]
fn parse_sign_up_garbage_is_parse_error() {
    assert!(matches!(parse_sign_up("[]"), Err(BackendError::Parse(_))));
}

// =============================================================================
// filters
// =============================================================================

#[test]
fn in_filter_joins_ids() {
    let a = Uuid::nil();
    let b = Uuid::from_u128(1);
    assert_eq!(in_filter(&[a, b]), format!("in.({a},{b})"));
}

#[test]
fn eq_filter_formats_id() {
    assert_eq!(eq_filter(Uuid::nil()), "eq.00000000-0000-0000-0000-000000000000");
}

// =============================================================================
// session handling (no network)
// =============================================================================

#[tokio::test]
async fn get_user_without_session_is_none() {
    let backend = RestBackend::new(config(None)).unwrap();
    assert!(backend.get_user().await.unwrap().is_none());
}

#[tokio::test]
async fn sign_out_without_session_emits_signed_out() {
    let backend = RestBackend::new(config(None)).unwrap();
    let mut rx = backend.subscribe_auth_events();
    backend.sign_out().await.unwrap();
    let event = rx.try_recv().unwrap();
    assert_eq!(event.kind, AuthEventKind::SignedOut);
    assert!(event.session.is_none());
}

#[tokio::test]
async fn empty_id_lists_skip_the_request() {
    let backend = RestBackend::new(config(None)).unwrap();
    assert!(backend.list_project_members(&[]).await.unwrap().is_empty());
    assert!(backend.list_projects(&[]).await.unwrap().is_empty());
}

#[test]
fn saved_session_is_restored() {
    let path = temp_path("session");
    let session = Session {
        access_token: "saved".into(),
        refresh_token: None,
        user: SessionUser { id: Uuid::nil(), email: None, metadata: UserMetadata::default() },
    };
    std::fs::write(&path, serde_json::to_vec(&session).unwrap()).unwrap();
    let backend = RestBackend::new(config(Some(path.clone()))).unwrap();
    assert_eq!(backend.access_token().as_deref(), Some("saved"));
    let _ = std::fs::remove_file(path);
}

#[test]
fn corrupt_session_file_is_ignored() {
    let path = temp_path("corrupt");
    std::fs::write(&path, "{not json").unwrap();
    let backend = RestBackend::new(config(Some(path.clone()))).unwrap();
    assert!(backend.access_token().is_none());
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn clearing_session_removes_file() {
    let path = temp_path("clear");
    std::fs::write(&path, "{}").unwrap();
    let backend = RestBackend::new(config(Some(path.clone()))).unwrap();
    backend.store_session(None).await;
    assert!(!path.exists());
}
