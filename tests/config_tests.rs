// Config loading, validation and hot reload tests

use hostpulse::config::{AppConfig, spawn_reloader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "127.0.0.1"

[metrics]
load_avg = true
cpu = true
disk = false
filesystem = true

[logging]
level = "debug"

[reload]
interval_secs = 60
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.server.host, "127.0.0.1");
    assert!(config.metrics.load_avg);
    assert!(config.metrics.cpu);
    assert!(!config.metrics.disk);
    assert!(config.metrics.filesystem);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.reload.interval_secs, 60);
}

#[test]
fn test_config_defaults_when_empty() {
    let config = AppConfig::load_from_str("").expect("empty config is valid");
    assert_eq!(config, AppConfig::default());
    assert_eq!(config.server.port, 50051);
    assert_eq!(config.server.host, "0.0.0.0");
    assert!(config.metrics.load_avg);
    assert!(!config.metrics.cpu);
    assert!(!config.metrics.disk);
    assert!(!config.metrics.filesystem);
    assert_eq!(config.logging.level, "info");
    assert!(config.logging.path.is_empty());
    assert_eq!(config.reload.interval_secs, 300);
}

#[test]
fn test_config_partial_section_keeps_other_defaults() {
    let config = AppConfig::load_from_str("[metrics]\ndisk = true\n").expect("valid");
    assert!(config.metrics.load_avg);
    assert!(config.metrics.disk);
    assert!(!config.metrics.cpu);
    assert_eq!(config.server.port, 50051);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_rejects_out_of_range_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 70000");
    assert!(AppConfig::load_from_str(&bad).is_err());
}

#[test]
fn test_config_validation_rejects_empty_host() {
    let bad = VALID_CONFIG.replace("host = \"127.0.0.1\"", "host = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.host"));
}

#[test]
fn test_config_validation_rejects_unknown_log_level() {
    let bad = VALID_CONFIG.replace("level = \"debug\"", "level = \"verbose\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("logging.level"));
}

#[test]
fn test_config_log_level_is_case_insensitive() {
    let config = AppConfig::load_from_str(&VALID_CONFIG.replace("\"debug\"", "\"WARN\""))
        .expect("valid");
    assert_eq!(config.logging.level, "WARN");
}

#[test]
fn test_config_logging_path_defaults_to_stderr() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("valid");
    assert!(config.logging.path.is_empty());
    assert!(config.logging.open_log_file().unwrap().is_none());
}

#[test]
fn test_config_logging_path_opens_file_for_append() {
    use std::io::Write;

    let dir = tempfile::TempDir::new().unwrap();
    let log_path = dir.path().join("hostpulse.log");
    std::fs::write(&log_path, "earlier line\n").unwrap();
    let toml = VALID_CONFIG.replace(
        "level = \"debug\"",
        &format!("level = \"debug\"\npath = {:?}", log_path.to_str().unwrap()),
    );
    let config = AppConfig::load_from_str(&toml).expect("valid");
    assert_eq!(config.logging.path, log_path.to_str().unwrap());

    let mut file = config.logging.open_log_file().unwrap().expect("file configured");
    writeln!(file, "later line").unwrap();
    drop(file);
    let content = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(content, "earlier line\nlater line\n");
}

#[test]
fn test_config_logging_path_creates_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let log_path = dir.path().join("new.log");
    let config = AppConfig::load_from_str(&format!(
        "[logging]\npath = {:?}\n",
        log_path.to_str().unwrap()
    ))
    .expect("valid");
    assert!(config.logging.open_log_file().unwrap().is_some());
    assert!(log_path.exists());
}

#[test]
fn test_config_logging_path_in_missing_directory_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let log_path = dir.path().join("no-such-dir").join("agent.log");
    let config = AppConfig::load_from_str(&format!(
        "[logging]\npath = {:?}\n",
        log_path.to_str().unwrap()
    ))
    .expect("valid");
    let err = config.logging.open_log_file().unwrap_err();
    assert!(err.to_string().contains("opening log file"));
}

#[test]
fn test_config_rejects_wrong_value_type() {
    let bad = VALID_CONFIG.replace("cpu = true", "cpu = \"yes\"");
    assert!(AppConfig::load_from_str(&bad).is_err());
}

#[test]
fn test_config_validation_rejects_invalid_toml() {
    let err = AppConfig::load_from_str("not valid toml [[[").unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn test_config_load_from_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    let config = AppConfig::load_from_path(&path).expect("load from file");
    assert_eq!(config.server.port, 8081);
    assert!(config.metrics.filesystem);
}

#[test]
fn test_config_load_optional_missing_file_is_none() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(AppConfig::load_optional(&path).unwrap().is_none());
    assert!(AppConfig::load_from_path(&path).is_err());
}

#[test]
fn test_config_load_optional_reports_invalid_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[server]\nport = 0\n").unwrap();
    assert!(AppConfig::load_optional(&path).is_err());
}

#[test]
fn test_config_path_resolution() {
    let flag = PathBuf::from("/etc/hostpulse/agent.toml");
    assert_eq!(AppConfig::resolve_path(Some(flag.clone())), flag);

    unsafe { std::env::set_var("CONFIG_FILE", "/tmp/from-env.toml") };
    let from_env = AppConfig::resolve_path(None);
    let flag_wins = AppConfig::resolve_path(Some(flag.clone()));
    unsafe { std::env::remove_var("CONFIG_FILE") };
    assert_eq!(from_env, PathBuf::from("/tmp/from-env.toml"));
    assert_eq!(flag_wins, flag);

    assert_eq!(AppConfig::resolve_path(None), PathBuf::from("config.toml"));
}

#[tokio::test(start_paused = true)]
async fn test_reloader_publishes_changes_and_keeps_last_good_value() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    let initial = AppConfig::load_from_path(&path).unwrap();
    let (tx, mut rx) = watch::channel(Arc::new(initial));
    let handle = spawn_reloader(path.clone(), Duration::from_secs(1), tx);

    std::fs::write(&path, VALID_CONFIG.replace("disk = false", "disk = true")).unwrap();
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("reload within a few ticks")
        .unwrap();
    assert!(rx.borrow_and_update().metrics.disk);

    // A broken file is ignored.
    std::fs::write(&path, "[server]\nport = \"nope\"\n").unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!rx.has_changed().unwrap());
    assert!(rx.borrow().metrics.disk);

    drop(rx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("reloader exits once receivers are gone")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reloader_skips_unchanged_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    let (tx, rx) = watch::channel(Arc::new(AppConfig::load_from_str(VALID_CONFIG).unwrap()));
    let _handle = spawn_reloader(path, Duration::from_secs(1), tx);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!rx.has_changed().unwrap());
}
