use duplex::config::{BackendKind, DuplexConfig, LogFormat, LogLevel};
use duplex::error::{DuplexError, EXIT_FATAL};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
backend = "tcp"

[logging]
level = "debug"
format = "json"

[primary]
name = "orders-primary"
address = "10.0.0.5:5432"
username = "app"
password = "s3cret"
connect_timeout_ms = 2000
max_retries = 5
retry_interval_ms = 250

[replica]
address = "10.0.0.6:5432"
username = "app"

[failover]
auto_failover = true
failover_retries = 4
failover_interval_ms = 1000
health_check_interval_ms = 2000
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config_from_file() {
    let file = write_config(FULL_CONFIG);
    let config = DuplexConfig::from_file(file.path()).unwrap();

    assert_eq!(config.backend, BackendKind::Tcp);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Json);

    let manager = config.validate().unwrap();
    assert_eq!(manager.primary.label(), "orders-primary");
    assert_eq!(manager.primary.connect_timeout, Duration::from_secs(2));
    assert_eq!(manager.primary.total_attempts(), 6);
    assert_eq!(manager.primary.retry_interval, Duration::from_millis(250));
    // Unset fields keep the library defaults
    assert_eq!(manager.primary.pool.max_open, 25);

    let replica = manager.replica.as_ref().unwrap();
    assert_eq!(replica.address, "10.0.0.6:5432");
    assert_eq!(replica.connect_timeout, Duration::from_secs(10));

    assert_eq!(manager.policy.failover_retries, 4);
    assert_eq!(manager.policy.health_check_interval, Duration::from_secs(2));
    assert!(manager.policy.use_replica);
}

#[test]
fn test_missing_file_is_config_error() {
    let err = DuplexConfig::from_file(std::path::Path::new("/nonexistent/duplex.toml")).unwrap_err();
    assert!(matches!(err, DuplexError::Config(_)));
    assert!(err.to_string().contains("/nonexistent/duplex.toml"));
    assert_eq!(err.exit_code(), EXIT_FATAL);
}

#[test]
fn test_malformed_file_names_path() {
    let file = write_config("[primary\naddress = ");
    let err = DuplexConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, DuplexError::Toml { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn test_invalid_pool_limits_rejected() {
    let file = write_config(
        r#"
        [primary]
        address = "db:5432"
        max_open = 2
        max_idle = 10

        [failover]
        use_replica = false
        "#,
    );
    let config = DuplexConfig::from_file(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("invalid primary configuration"));
}

#[test]
fn test_primary_only_config() {
    let config = DuplexConfig::from_toml_str(
        r#"
        [primary]
        address = "cache:6379"

        [failover]
        use_replica = false
        auto_failover = false
        "#,
    )
    .unwrap();

    let manager = config.validate().unwrap();
    assert!(!manager.replica_enabled());
}

#[test]
fn test_redacted_output_round_trips() {
    let config = DuplexConfig::from_toml_str(FULL_CONFIG).unwrap();
    let rendered = config.to_redacted_toml().unwrap();
    assert!(!rendered.contains("s3cret"));

    let reparsed = DuplexConfig::from_toml_str(&rendered).unwrap();
    assert_eq!(reparsed.primary.address, config.primary.address);
    assert_eq!(reparsed.failover, config.failover);
    assert!(reparsed.primary.password.is_empty());
}
