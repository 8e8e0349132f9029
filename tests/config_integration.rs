use kcd_client::config::{AppConfig, ResolveMode, StartupVariant};
use serial_test::serial;
use std::env;
use std::fs;

// Clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        for key in [
            "CONFIG_FILE",
            "KCD_API_BASE",
            "KCD_STORE",
            "KCD_API__BASE_URL",
            "KCD_API__MODE",
            "KCD_API__FALLBACKS",
            "KCD_API__TIMEOUT_SECS",
            "KCD_CHAT__POLL_INTERVAL_SECS",
            "KCD_SESSION__STARTUP",
            "VITE_API_BASE_URL",
            "VITE_API_URL",
        ] {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(["kcd"]).unwrap();
    assert_eq!(config.api.timeout_secs, 10);
    assert_eq!(config.api.mode, ResolveMode::Candidates);
    assert_eq!(config.api.frontend_origin, "http://localhost:8000");
    assert_eq!(config.api.denylist, vec!["kcd-frontend.onrender.com"]);
    assert!(config.api.base_url.is_none());
    assert_eq!(config.chat.poll_interval_secs, 5);
    assert_eq!(config.session.startup, StartupVariant::Splash);
    assert_eq!(config.demo.email, "free@kcd-agency.com");
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("KCD_API__BASE_URL", "https://staging.example.com/api/v1");
        env::set_var("KCD_API__FALLBACKS", "http://a.test/api,http://b.test");
        env::set_var("KCD_SESSION__STARTUP", "direct_login");
    }

    let config = AppConfig::load_from_args(["kcd"]).expect("Failed to load config");
    assert_eq!(
        config.api.base_url.as_deref(),
        Some("https://staging.example.com/api/v1")
    );
    assert_eq!(config.api.fallbacks, vec!["http://a.test/api", "http://b.test"]);
    assert_eq!(config.session.startup, StartupVariant::DirectLogin);

    clear_env_vars();
}

#[test]
#[serial]
fn test_legacy_env_names() {
    clear_env_vars();
    unsafe {
        env::set_var("VITE_API_URL", "https://legacy.example.com");
    }

    let config = AppConfig::load_from_args(["kcd"]).unwrap();
    assert_eq!(
        config.api.base_url.as_deref(),
        Some("https://legacy.example.com")
    );

    unsafe {
        env::set_var("KCD_API__BASE_URL", "https://preferred.example.com");
    }
    let config = AppConfig::load_from_args(["kcd"]).unwrap();
    assert_eq!(
        config.api.base_url.as_deref(),
        Some("https://preferred.example.com")
    );

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let config_content = r#"
api:
  base_url: https://kcd-backend-xeak.onrender.com/api
  mode: locked
  timeout_secs: 4
chat:
  poll_interval_secs: 2
    "#;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("kcd.yaml");
    fs::write(&file_path, config_content).expect("Failed to write temp config");

    // Point the config flag at the file through its env fallback
    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = AppConfig::load_from_args(["kcd"]).expect("Failed to load config from file");
    assert_eq!(config.api.mode, ResolveMode::Locked);
    assert_eq!(config.api.timeout_secs, 4);
    assert_eq!(config.chat.poll_interval_secs, 2);
    // Untouched keys keep their defaults
    assert_eq!(config.api.frontend_origin, "http://localhost:8000");

    // Env still beats the file
    unsafe {
        env::set_var("KCD_API__TIMEOUT_SECS", "7");
    }
    let config = AppConfig::load_from_args(["kcd"]).unwrap();
    assert_eq!(config.api.timeout_secs, 7);

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_config_file_is_an_error() {
    clear_env_vars();

    let result = AppConfig::load_from_args(["kcd", "--config", "/nonexistent/kcd.yaml"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_cli_flags_win() {
    clear_env_vars();
    unsafe {
        env::set_var("KCD_API__BASE_URL", "https://env.example.com/api");
        env::set_var("KCD_API__MODE", "candidates");
    }

    let config = AppConfig::load_from_args([
        "kcd",
        "--api-base",
        "http://127.0.0.1:8000/api",
        "--locked",
        "--store",
        "/tmp/kcd-session.json",
        "--poll-interval",
        "30",
    ])
    .unwrap();
    assert_eq!(
        config.api.base_url.as_deref(),
        Some("http://127.0.0.1:8000/api")
    );
    assert_eq!(config.api.mode, ResolveMode::Locked);
    assert_eq!(
        config.session.store_path().to_string_lossy(),
        "/tmp/kcd-session.json"
    );
    assert_eq!(config.chat.poll_interval_secs, 30);

    clear_env_vars();
}
