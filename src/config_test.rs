use super::*;
use std::sync::Mutex;

// Env mutation is unsafe in edition 2024 and process-global; serialize it.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "BACKEND_URL",
    "BACKEND_ANON_KEY",
    "BACKEND_REQUEST_TIMEOUT_SECS",
    "BACKEND_CONNECT_TIMEOUT_SECS",
    "BACKEND_SESSION_PATH",
    "AUTH_STATE_PATH",
    "PROFILE_WAIT_ATTEMPTS",
    "PROFILE_WAIT_BASE_MS",
    "PROFILE_WAIT_MAX_MS",
];

/// # Safety
/// Callers must hold `ENV_LOCK`.
unsafe fn clear_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

// =============================================================================
// BackendConfig::from_env
// =============================================================================

#[test]
fn backend_from_env_all_set() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_env();
        std::env::set_var("BACKEND_URL", "https://demo.example.co/");
        std::env::set_var("BACKEND_ANON_KEY", "anon123");
        std::env::set_var("BACKEND_REQUEST_TIMEOUT_SECS", "5");
        std::env::set_var("BACKEND_SESSION_PATH", "/tmp/s.json");
    }
    let config = BackendConfig::from_env().unwrap();
    assert_eq!(config.url, "https://demo.example.co");
    assert_eq!(config.anon_key, "anon123");
    assert_eq!(config.timeouts.request_secs, 5);
    assert_eq!(config.timeouts.connect_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    assert_eq!(config.session_path, Some(PathBuf::from("/tmp/s.json")));
    unsafe { clear_env() };
}

#[test]
fn backend_from_env_missing_url() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_env();
        std::env::set_var("BACKEND_ANON_KEY", "anon123");
    }
    let err = BackendConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::MissingVar { ref var } if var == "BACKEND_URL"));
    unsafe { clear_env() };
}

#[test]
fn backend_from_env_blank_key_is_missing() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_env();
        std::env::set_var("BACKEND_URL", "https://demo.example.co");
        std::env::set_var("BACKEND_ANON_KEY", "  ");
    }
    let err = BackendConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::MissingVar { ref var } if var == "BACKEND_ANON_KEY"));
    unsafe { clear_env() };
}

#[test]
fn config_from_env_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_env();
        std::env::set_var("BACKEND_URL", "http://localhost:54321");
        std::env::set_var("BACKEND_ANON_KEY", "k");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.auth_state_path, PathBuf::from(DEFAULT_AUTH_STATE_PATH));
    assert_eq!(config.profile_wait, ProfileWaitConfig::default());
    assert_eq!(config.backend.session_path, Some(PathBuf::from(DEFAULT_SESSION_PATH)));
    unsafe { clear_env() };
}

#[test]
fn profile_wait_from_env_invalid_uses_default() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_env();
        std::env::set_var("PROFILE_WAIT_ATTEMPTS", "lots");
        std::env::set_var("PROFILE_WAIT_BASE_MS", "50");
    }
    let config = ProfileWaitConfig::from_env();
    assert_eq!(config.attempts, DEFAULT_PROFILE_WAIT_ATTEMPTS);
    assert_eq!(config.base_delay_ms, 50);
    unsafe { clear_env() };
}

// =============================================================================
// normalize_url
// =============================================================================

#[test]
fn normalize_url_trims_trailing_slashes() {
    assert_eq!(normalize_url(" https://x.co// ").unwrap(), "https://x.co");
}

#[test]
fn normalize_url_rejects_other_schemes() {
    assert!(matches!(normalize_url("ftp://x.co"), Err(ConfigError::Parse(_))));
    assert!(normalize_url("x.co").is_err());
}

// =============================================================================
// ProfileWaitConfig::delay_for
// =============================================================================

#[test]
fn delay_doubles_then_caps() {
    let config = ProfileWaitConfig { attempts: 5, base_delay_ms: 100, max_delay_ms: 350 };
    assert_eq!(config.delay_for(1), Duration::from_millis(100));
    assert_eq!(config.delay_for(2), Duration::from_millis(200));
    assert_eq!(config.delay_for(3), Duration::from_millis(350));
    assert_eq!(config.delay_for(40), Duration::from_millis(350));
}

#[test]
fn delay_zero_base_is_zero() {
    let config = ProfileWaitConfig { attempts: 3, base_delay_ms: 0, max_delay_ms: 0 };
    assert_eq!(config.delay_for(3), Duration::ZERO);
}

#[test]
fn env_parse_missing_returns_default() {
    let val: u32 = env_parse("__TASKBOARD_TEST_NONEXISTENT__", 42);
    assert_eq!(val, 42);
}
