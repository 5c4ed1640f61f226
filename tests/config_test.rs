//! Configuration loading tests
//!
//! Verifies the layering order (command line > environment > file > defaults) and the
//! fallback substitutions for out-of-range limits.

use std::env;
use std::fs;
use std::time::Duration;

use conn_proxy::config::{
    check_warnings, ConfigBuilder, ConfigValues, ConfigurationProvider, ProxyConfig, ValueSource,
    ENV_PREFIX,
};
use serial_test::serial;
use tempfile::TempDir;

const ENV_KEYS: [&str; 10] = [
    "HOST",
    "PORT",
    "BUFFER_SIZE",
    "MAX_CONNECTIONS",
    "TIMEOUT",
    "ALLOW_IP",
    "PASS_PROXY",
    "PRINT_LOG",
    "PRINT_SUMMARY",
    "LOG_LEVEL",
];

fn clear_env() {
    for key in ENV_KEYS {
        env::remove_var(format!("{}{}", ENV_PREFIX, key));
    }
}

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.json");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_defaults() {
    let config = ProxyConfig::default();

    assert_eq!(config.host(), "0.0.0.0");
    assert_eq!(config.port(), 8080);
    assert_eq!(config.buffer_size(), 16384);
    assert_eq!(config.max_connections(), 100);
    assert_eq!(config.timeout(), 10);
    assert_eq!(config.admission_wait(), Duration::from_secs(5));
    assert_eq!(config.allow_ip(), "");
    assert!(!config.allows_all());
    assert_eq!(config.pass_proxy(), None);
    assert!(!config.print_log());
    assert!(!config.print_summary());
}

#[test]
fn test_out_of_range_limits_fall_back() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ "BuffSize": 0, "AllowMaxConn": 0, "Timeout": 1 }"#);

    let config = ConfigBuilder::new()
        .with_defaults()
        .with_file(&path)
        .build()
        .unwrap();

    assert_eq!(config.buffer_size(), 16384);
    assert_eq!(config.max_connections(), 100);
    assert_eq!(config.timeout(), 10);
    assert_eq!(check_warnings(&config).len(), 3);

    // Negative values behave like zero
    let config = ConfigBuilder::new()
        .with_defaults()
        .with_cli(ConfigValues {
            buffer_size: Some(-5),
            max_connections: Some(-1),
            timeout: Some(-30),
            ..Default::default()
        })
        .build()
        .unwrap();
    assert_eq!(config.buffer_size(), 16384);
    assert_eq!(config.max_connections(), 100);
    assert_eq!(config.timeout(), 10);
}

#[test]
fn test_minimum_timeout_is_kept() {
    let config = ConfigBuilder::new()
        .with_defaults()
        .with_cli(ConfigValues {
            timeout: Some(2),
            ..Default::default()
        })
        .build()
        .unwrap();

    assert_eq!(config.timeout(), 2);
    assert_eq!(config.admission_wait(), Duration::from_secs(1));
    assert!(check_warnings(&config).is_empty());
}

#[test]
fn test_file_accepts_both_key_styles() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "Port": 3128,
            "buffer_size": 4096,
            "AllowIpStr": "10.0.0.5,10.0.0.6",
            "PassProxy": "127.0.0.1:9000",
            "PrintIpSummary": true
        }"#,
    );

    let config = ConfigBuilder::new()
        .with_defaults()
        .with_file(&path)
        .build()
        .unwrap();

    assert_eq!(config.port(), 3128);
    assert_eq!(config.buffer_size(), 4096);
    assert_eq!(config.allow_ip(), "10.0.0.5,10.0.0.6");
    assert_eq!(config.pass_proxy(), Some("127.0.0.1:9000"));
    assert!(config.print_summary());
    assert_eq!(config.source("port"), "file");
    assert_eq!(config.source("timeout"), "default");
    assert_eq!(config.config_file(), Some(path.as_path()));
}

#[test]
fn test_unknown_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ "port": 8080, "listen": "0.0.0.0:8080" }"#);

    let result = ConfigBuilder::new().with_defaults().with_file(&path).load_config();
    assert!(result.is_err());
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new()
        .with_defaults()
        .with_file(dir.path().join("absent.json"))
        .build()
        .unwrap();

    assert_eq!(config, ProxyConfig::default());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ "port": 3128, "timeout": 30, "allow_ip": "10.0.0.1" }"#);

    env::set_var(format!("{}PORT", ENV_PREFIX), "3129");
    env::set_var(format!("{}ALLOW_IP", ENV_PREFIX), "*");
    env::set_var(format!("{}PRINT_LOG", ENV_PREFIX), "true");

    let config = ConfigBuilder::new()
        .with_defaults()
        .with_file(&path)
        .with_env(ENV_PREFIX)
        .build()
        .unwrap();
    clear_env();

    assert_eq!(config.port(), 3129);
    assert_eq!(config.timeout(), 30);
    assert!(config.allows_all());
    assert!(config.print_log());
    assert_eq!(config.effective_log_level(), "debug");
    assert_eq!(config.sources.get("port"), Some(&ValueSource::Environment));
    assert_eq!(config.sources.get("timeout"), Some(&ValueSource::File));
}

#[test]
#[serial]
fn test_command_line_overrides_environment() {
    clear_env();
    env::set_var(format!("{}MAX_CONNECTIONS", ENV_PREFIX), "50");
    env::set_var(format!("{}LOG_LEVEL", ENV_PREFIX), "warn");

    let config = ConfigBuilder::new()
        .with_defaults()
        .with_env(ENV_PREFIX)
        .with_cli(ConfigValues {
            max_connections: Some(7),
            ..Default::default()
        })
        .build()
        .unwrap();
    clear_env();

    assert_eq!(config.max_connections(), 7);
    assert_eq!(config.log_level(), "warn");
    assert_eq!(config.source("max_connections"), "command line");
    assert_eq!(config.source("log_level"), "environment");
}

#[test]
#[serial]
fn test_unparsable_environment_value_is_ignored() {
    clear_env();
    env::set_var(format!("{}PORT", ENV_PREFIX), "not-a-port");

    let config = ConfigBuilder::new()
        .with_defaults()
        .with_env(ENV_PREFIX)
        .build()
        .unwrap();
    clear_env();

    assert_eq!(config.port(), 8080);
}

#[test]
fn test_invalid_pass_proxy_is_rejected() {
    let result = ConfigBuilder::new()
        .with_defaults()
        .with_cli(ConfigValues {
            pass_proxy: Some("just-a-host".to_string()),
            ..Default::default()
        })
        .load_config();

    assert!(result.is_err());
}
