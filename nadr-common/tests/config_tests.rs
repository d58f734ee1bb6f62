//! Configuration file loading and path resolution
//!
//! Tests that touch NADR_CONFIG are marked #[serial] so they never race on
//! the process environment.

use nadr_common::config::{ConfigSource, CONFIG_ENV_VAR};
use nadr_common::{Config, Error};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(text.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_empty_file_uses_defaults() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.transport.mtu, 1500);
    assert!(config.transport.zero_copy);
    assert_eq!(config.transport.reconfigure_timeout_ms, 500);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let config = Config::from_toml_str(
        r#"
        [transport]
        zero_copy = false
        cycle_time_us = 2620

        [jitter]
        compressed_ms = 250
        "#,
    )
    .unwrap();

    assert!(!config.transport.zero_copy);
    assert_eq!(config.transport.cycle_time_us, Some(2620));
    assert_eq!(config.transport.mtu, 1500);
    assert_eq!(config.jitter.compressed_ms, 250);
    assert_eq!(config.jitter.uncompressed_ms, 100);
    assert_eq!(config.buffer.pcm_seconds, 1.0);
}

#[test]
fn test_type_mismatch_is_parse_error() {
    let result = Config::from_toml_str("[transport]\nmtu = \"large\"\n");
    assert!(matches!(result, Err(Error::Parse(_))));
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let file = write_config("[buffer]\nmin_bytes = 0\n");
    let result = Config::load(file.path());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_load_missing_file_is_io_error() {
    let result = Config::load(Path::new("/nonexistent/nadr/config.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
#[serial]
fn test_cli_path_beats_environment() {
    let cli = write_config("[transport]\nmtu = 9000\n");
    let env_file = write_config("[transport]\nmtu = 4000\n");
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    let config = Config::resolve(Some(cli.path())).unwrap();
    assert_eq!(config.transport.mtu, 9000);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_variable_used_without_cli() {
    let env_file = write_config("[transport]\nmtu = 4000\n");
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    assert_eq!(
        ConfigSource::resolve(None),
        ConfigSource::Explicit(env_file.path().to_path_buf())
    );
    let config = Config::resolve(None).unwrap();
    assert_eq!(config.transport.mtu, 4000);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/nadr-env.toml");
    assert!(Config::resolve(None).is_err());
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_no_overrides_falls_back_to_user_default() {
    env::remove_var(CONFIG_ENV_VAR);
    match ConfigSource::resolve(None) {
        ConfigSource::UserDefault(path) => {
            assert!(path.ends_with("nadr/config.toml"));
        }
        ConfigSource::Defaults => {}
        other => panic!("unexpected source: {:?}", other),
    }
}
