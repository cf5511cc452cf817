mod common;

use chrono_tz::Europe::Paris;
use common::{actor, catalog, utc, write_hourly};
use ems_timeseries::auth::AllowAll;
use ems_timeseries::codec;
use ems_timeseries::config::{ConfigError, Settings};
use ems_timeseries::engine::BucketRequest;
use ems_timeseries::model::TimeseriesId;
use ems_timeseries::store::MemoryStore;
use ems_timeseries::{Engine, TimeseriesError};
use serial_test::serial;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn toml(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_file_settings_reach_the_engine() {
    let file = toml(
        r#"
[engine]
default_timezone = "Europe/Paris"

[codec]
csv_delimiter = ";"

[completeness]
default_interval_secs = 3600
"#,
    );
    let settings = Settings::load_from(file.path()).unwrap();
    assert_eq!(settings.timezone().unwrap(), Paris);

    let engine = Engine::builder(
        Arc::new(MemoryStore::new()),
        Arc::new(catalog()),
        Arc::new(AllowAll),
    )
    .settings(settings)
    .build()
    .unwrap();
    assert_eq!(engine.default_timezone(), Paris);

    write_hourly(&engine, "1", utc(2020, 1, 1, 0, 0), 1, |_| 4.0);
    let request = BucketRequest::new([TimeseriesId(1)], utc(2020, 1, 1, 0, 0), utc(2020, 1, 1, 1, 0));
    let text = codec::export_buckets_csv(&engine, &actor(), &request).unwrap();
    assert_eq!(text, "Datetime;1\n2020-01-01T01:00:00+01:00;4.0\n");
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = toml("[logging]\nlevel = \"warn\"\n");
    std::env::set_var("EMS_TS_LOGGING__LEVEL", "debug");
    std::env::set_var("EMS_TS_ENGINE__ASSOCIATION_RETRIES", "7");
    let settings = Settings::load_from(file.path());
    std::env::remove_var("EMS_TS_LOGGING__LEVEL");
    std::env::remove_var("EMS_TS_ENGINE__ASSOCIATION_RETRIES");

    let settings = settings.unwrap();
    assert_eq!(settings.logging.level, "debug");
    assert_eq!(settings.engine.association_retries, 7);
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    let settings = Settings::load_from("/nonexistent/ems_timeseries.toml").unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
#[serial]
fn test_invalid_file_is_rejected() {
    let file = toml("[engine]\ndefault_timezone = \"Mars/Olympus\"\n");
    assert!(matches!(
        Settings::load_from(file.path()),
        Err(ConfigError::ValidationError(_))
    ));

    let file = toml("[engine]\nassociation_retries = \"many\"\n");
    assert!(matches!(
        Settings::load_from(file.path()),
        Err(ConfigError::LoadError(_))
    ));
}

#[test]
fn test_engine_rejects_hand_built_invalid_settings() {
    let build = |settings: Settings| {
        Engine::builder(
            Arc::new(MemoryStore::new()),
            Arc::new(catalog()),
            Arc::new(AllowAll),
        )
        .settings(settings)
        .build()
    };

    let mut retries = Settings::default();
    retries.engine.association_retries = 0;
    assert!(matches!(
        build(retries),
        Err(TimeseriesError::Config(ConfigError::ValidationError(_)))
    ));

    let mut delimiter = Settings::default();
    delimiter.codec.csv_delimiter = '§';
    assert!(matches!(
        build(delimiter),
        Err(TimeseriesError::Config(ConfigError::ValidationError(_)))
    ));

    assert!(build(Settings::default()).is_ok());
}
