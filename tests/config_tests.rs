use aimi::config::{AppConfig, ChatConfig};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const OVERRIDE_VARS: [&str; 10] = [
    "AIMI_PROVIDER",
    "AIMI_MODEL",
    "AIMI_API_KEY_SOURCE",
    "AIMI_BASE_URL",
    "AIMI_TEMPERATURE",
    "AIMI_LOG_LEVEL",
    "AIMI_DB_PATH",
    "AIMI_HOST",
    "AIMI_PORT",
    "AIMI_CONTEXT_MESSAGE_LIMIT",
];

fn clear_overrides() {
    for var in OVERRIDE_VARS {
        env::remove_var(var);
    }
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("aimi.config.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[database]
path = "/tmp/aimi-test.duckdb"

[model]
provider = "openai"
model_name = "gpt-4o"
api_key_source = "env:MY_KEY"
temperature = 0.2

[server]
host = "0.0.0.0"
port = 9000
enable_cors = false

[chat]
context_message_limit = 10
cache_size = 50

[logging]
level = "debug"
"#,
    );

    let config = AppConfig::load_from_file(&path).unwrap();

    assert_eq!(config.database.path, PathBuf::from("/tmp/aimi-test.duckdb"));
    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.model_name.as_deref(), Some("gpt-4o"));
    assert_eq!(config.model.api_key_source.as_deref(), Some("env:MY_KEY"));
    assert_eq!(config.model.temperature, 0.2);
    assert_eq!(config.server.port, 9000);
    assert!(!config.server.enable_cors);
    assert_eq!(
        config.chat,
        ChatConfig {
            context_message_limit: 10,
            cache_size: 50
        }
    );
    assert_eq!(config.logging.level, "debug");
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_is_created_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("aimi.config.toml");

    let config = AppConfig::load_from_file(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config, AppConfig::embedded_default().unwrap());
    let reloaded = AppConfig::load_from_file(&path).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_invalid_toml_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[model\nprovider = ");
    let err = AppConfig::load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_validation_failures() {
    let mut config = AppConfig::default();
    config.model.provider = "anthropic".to_string();
    assert!(config
        .validate()
        .unwrap_err()
        .to_string()
        .contains("Invalid model provider"));

    let mut config = AppConfig::default();
    config.model.temperature = 2.5;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.logging.level = "verbose".to_string();
    assert!(config
        .validate()
        .unwrap_err()
        .to_string()
        .contains("Invalid log level"));

    let mut config = AppConfig::default();
    config.server.port = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.chat.context_message_limit = 0;
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_overrides();
    env::set_var("AIMI_PROVIDER", "openai");
    env::set_var("AIMI_MODEL", "gpt-4.1-mini");
    env::set_var("AIMI_TEMPERATURE", "1.1");
    env::set_var("AIMI_PORT", "9100");
    env::set_var("AIMI_LOG_LEVEL", "WARN");
    env::set_var("AIMI_DB_PATH", "/tmp/override.duckdb");
    env::set_var("AIMI_CONTEXT_MESSAGE_LIMIT", "7");

    let mut config = AppConfig::default();
    config.apply_env_overrides();
    clear_overrides();

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.model_name.as_deref(), Some("gpt-4.1-mini"));
    assert_eq!(config.model.temperature, 1.1);
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.database.path, PathBuf::from("/tmp/override.duckdb"));
    assert_eq!(config.chat.context_message_limit, 7);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_unparseable_env_numbers_are_ignored() {
    clear_overrides();
    env::set_var("AIMI_PORT", "not-a-port");
    env::set_var("AIMI_TEMPERATURE", "warm");

    let mut config = AppConfig::default();
    config.apply_env_overrides();
    clear_overrides();

    assert_eq!(config.server.port, 8000);
    assert_eq!(config.model.temperature, 0.7);
}

#[test]
#[serial]
fn test_config_path_env_is_used_when_no_local_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[model]\nprovider = \"openai\"\n");
    let previous = env::current_dir().unwrap();
    env::set_current_dir(dir.path().join("..")).unwrap();
    env::set_var("AIMI_CONFIG_PATH", &path);

    let loaded = AppConfig::load();

    env::remove_var("AIMI_CONFIG_PATH");
    env::set_current_dir(previous).unwrap();

    // A ~/.aimi/aimi.config.toml on the machine takes precedence.
    let home_config = directories::BaseDirs::new()
        .map(|b| b.home_dir().join(".aimi").join("aimi.config.toml"));
    if home_config.map_or(false, |p| p.exists()) {
        return;
    }
    assert_eq!(loaded.unwrap().model.provider, "openai");
}

#[test]
fn test_summary_mentions_key_settings() {
    let config = AppConfig::embedded_default().unwrap();
    let summary = config.summary();
    assert!(summary.contains("Model Provider: mock"));
    assert!(summary.contains("Server: 127.0.0.1:8000"));
    assert!(summary.contains("Context Messages: 20"));
}
