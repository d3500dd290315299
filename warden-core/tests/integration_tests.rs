//! Integration tests for warden-core infrastructure

use tempfile::TempDir;
use warden_core::{
    config_error, init_logging, validation_error, Lifetime, LogFormat,
    LoggingConfig, WardenConfig, WardenError,
};

#[test]
fn test_error_macros() {
    let error = config_error!("Bad config", "test_component");
    match &error {
        WardenError::Config { message, context, .. } => {
            assert_eq!(message, "Bad config");
            assert_eq!(context.component, "test_component");
            assert!(!context.recovery_suggestions.is_empty());
        }
        _ => panic!("Expected Config error"),
    }
    error.log();

    let error = validation_error!("Out of range", "sessions.lifetime", "test");
    match error {
        WardenError::Validation { field, .. } => {
            assert_eq!(field.as_deref(), Some("sessions.lifetime"));
        }
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = WardenConfig::default();
    config.database.url = "sqlite:/tmp/warden-test.db".to_string();
    config.sessions.lifetime = Lifetime::hours(6);
    config.sessions.renewal_period = Lifetime::weeks(2);
    config.logging.format = LogFormat::Json;
    config.save_to_file(&path).unwrap();

    let loaded = WardenConfig::from_file(&path).unwrap();
    assert_eq!(loaded.database.url, "sqlite:/tmp/warden-test.db");
    assert_eq!(loaded.sessions.lifetime, Lifetime::hours(6));
    assert_eq!(loaded.sessions.renewal_period, Lifetime::weeks(2));
    assert_eq!(loaded.logging.format, LogFormat::Json);
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[sessions]\npurge_interval_secs = 60\n\n[sessions.lifetime]\nminutes = 30\n",
    )
    .unwrap();

    let loaded = WardenConfig::from_file(&path).unwrap();
    assert_eq!(loaded.sessions.purge_interval_secs, 60);
    assert_eq!(loaded.sessions.lifetime, Lifetime::minutes(30));
    assert_eq!(loaded.sessions.renewal_period, Lifetime::days(30));
    assert_eq!(loaded.database.max_connections, 5);
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[database]\nmax_connections = 0\n").unwrap();

    assert!(matches!(
        WardenConfig::from_file(&path),
        Err(WardenError::Validation { .. })
    ));

    std::fs::write(&path, "this is = = not toml").unwrap();
    assert!(matches!(
        WardenConfig::from_file(&path),
        Err(WardenError::Config { .. })
    ));

    assert!(WardenConfig::from_file(dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        filter_directives: vec!["warden_core=debug".to_string()],
        ..LoggingConfig::default()
    };

    init_logging(&config).unwrap();

    // A second install reports an error instead of panicking
    assert!(init_logging(&config).is_err());
}

#[test]
fn test_config_with_huge_lifetime_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[sessions.lifetime]\nyears = 300000\n").unwrap();

    match WardenConfig::from_file(&path) {
        Err(WardenError::Validation { field, .. }) => {
            assert_eq!(field.as_deref(), Some("sessions.lifetime"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_unreadable_config_records_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.toml");

    let error = WardenConfig::from_file(&path).unwrap_err();
    let context = error.context().expect("config errors carry context");
    assert_eq!(context.operation.as_deref(), Some("read_file"));
    assert_eq!(
        context.metadata.get("path").map(String::as_str),
        Some(path.display().to_string().as_str())
    );
}
