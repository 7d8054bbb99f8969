use std::io::Write;

use gamebridge::error::{ConfigError, Error};
use gamebridge::infrastructure::config::settings::Config;
use gamebridge::infrastructure::config::LogFormat;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}

#[test]
fn example_config_loads() {
    let content = include_str!("../config.example.toml");
    let file = write_config(content);

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.providers.len(), 3);
    assert_eq!(config.schedules().len(), 3);
    let sportsbook = config
        .providers
        .iter()
        .find(|p| p.id.as_str() == "sportsbook")
        .unwrap();
    assert_eq!(sportsbook.sync_interval_secs, 3600);
    assert_eq!(sportsbook.http.timeout_ms, 10_000);
}

#[test]
fn invalid_values_are_reported_by_field() {
    let file = write_config(
        r#"
        [reaper]
        interval_secs = 0
        "#,
    );

    let err = Config::load(file.path()).unwrap_err();
    match err {
        Error::Config(ConfigError::InvalidValue { field, .. }) => {
            assert_eq!(field, "interval_secs");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_log_format_fails_to_parse() {
    let file = write_config(
        r#"
        [logging]
        format = "xml"
        "#,
    );

    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::Parse(_))));
}

#[test]
fn reaper_retention_is_capped() {
    let err = Config::parse_toml("[reaper]\nretention_secs = 10000000000000").unwrap_err();
    match err {
        Error::Config(ConfigError::InvalidValue { field, .. }) => {
            assert_eq!(field, "retention_secs");
        }
        other => panic!("unexpected error: {other}"),
    }
}
