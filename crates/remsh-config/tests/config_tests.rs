//! Loading configuration from files and the environment

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use proptest::prelude::*;
use remsh_config::{ConfigError, ConfigManager, RemshConfig};
use tempfile::TempDir;

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let manager =
        ConfigManager::with_path(dir.path().join("absent.toml")).with_env_prefix("REMSHTESTMISSING");

    let config = manager.load().unwrap();
    assert_eq!(config, RemshConfig::default());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[terminal]
prompt = "remote> "
shell_mode = false

[history]
max_size = 250

[storage]
data_dir = "/srv/remsh"
"#,
    )
    .unwrap();

    let config = ConfigManager::with_path(&path)
        .with_env_prefix("REMSHTESTPARTIAL")
        .load()
        .unwrap();
    assert_eq!(config.terminal.prompt, "remote> ");
    assert!(!config.terminal.shell_mode);
    assert_eq!(config.terminal.max_lines, 10_000);
    assert_eq!(config.history.max_size, 250);
    assert_eq!(config.storage.data_dir, PathBuf::from("/srv/remsh"));
    assert_eq!(config.polling.max_interval_ms, 500);

    let options = config.engine_options();
    assert!(!options.shell_mode);
    assert_eq!(options.settle_delay, Duration::from_millis(500));
}

#[test]
fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[guard]\nmax_commands_per_window = 20\n").unwrap();

    std::env::set_var("REMSHTESTENV_GUARD__MAX_COMMANDS_PER_WINDOW", "3");
    std::env::set_var("REMSHTESTENV_POLLING__MIN_INTERVAL_MS", "80");
    let loaded = ConfigManager::with_path(&path)
        .with_env_prefix("REMSHTESTENV")
        .load();
    std::env::remove_var("REMSHTESTENV_GUARD__MAX_COMMANDS_PER_WINDOW");
    std::env::remove_var("REMSHTESTENV_POLLING__MIN_INTERVAL_MS");

    let config = loaded.unwrap();
    assert_eq!(config.guard.max_commands_per_window, 3);
    assert_eq!(config.polling.min_interval_ms, 80);
}

#[test]
fn test_invalid_file_values_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[transfer]\nbuffer_size = 0\n").unwrap();

    let result = ConfigManager::with_path(&path)
        .with_env_prefix("REMSHTESTINVALID")
        .load();
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_malformed_file_is_load_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[terminal\nprompt = ").unwrap();

    let result = ConfigManager::with_path(&path)
        .with_env_prefix("REMSHTESTMALFORMED")
        .load();
    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
fn test_save_then_load_preserves_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/remsh/config.toml");
    let manager = ConfigManager::with_path(&path).with_env_prefix("REMSHTESTSAVE");

    let mut config = RemshConfig::default();
    config.terminal.prompt = "% ".into();
    config.transfer.max_upload_bytes = 1024;
    config.storage.data_dir = dir.path().join("data");
    manager.save(&config).unwrap();

    assert!(path.exists());
    assert_eq!(manager.load().unwrap(), config);
}

#[test]
fn test_save_refuses_invalid_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let manager = ConfigManager::with_path(&path);

    let mut config = RemshConfig::default();
    config.terminal.cols = 0;
    assert!(matches!(
        manager.save(&config),
        Err(ConfigError::Validation(_))
    ));
    assert!(!path.exists());
}

proptest! {
    #[test]
    fn prop_poll_bounds_validation(min in 0u64..2000, max in 0u64..2000) {
        let manager = ConfigManager::with_path("unused.toml");
        let mut config = RemshConfig::default();
        config.polling.min_interval_ms = min;
        config.polling.max_interval_ms = max;

        let valid = manager.validate(&config).is_ok();
        prop_assert_eq!(valid, min > 0 && min <= max);
    }
}
