use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// One week.
pub const MAX_STALE_AFTER_SECS: u64 = 7 * 24 * 3600;
/// Ten years.
pub const MAX_FAILED_RETENTION_HOURS: u64 = 10 * 365 * 24;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.ocr.program.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "ocr.program must not be empty".to_string(),
        });
    }

    if config.ocr.timeout_secs == 0 || config.ocr.max_output_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "ocr.timeout_secs and ocr.max_output_bytes must be positive".to_string(),
        });
    }

    let queue = &config.queue;
    if queue.heartbeat_secs == 0 || queue.recovery_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "queue.heartbeat_secs and queue.recovery_interval_secs must be positive"
                .to_string(),
        });
    }

    // A heartbeat slower than the staleness window lets a live job look orphaned.
    if queue.heartbeat_secs >= queue.stale_after_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "queue.heartbeat_secs ({}) must be below queue.stale_after_secs ({})",
                queue.heartbeat_secs, queue.stale_after_secs
            ),
        });
    }

    if queue.stale_after_secs > MAX_STALE_AFTER_SECS {
        return Err(ConfigError::Validation {
            message: format!(
                "queue.stale_after_secs ({}) exceeds the maximum of {}",
                queue.stale_after_secs, MAX_STALE_AFTER_SECS
            ),
        });
    }

    if queue.failed_retention_hours > MAX_FAILED_RETENTION_HOURS {
        return Err(ConfigError::Validation {
            message: format!(
                "queue.failed_retention_hours ({}) exceeds the maximum of {}",
                queue.failed_retention_hours, MAX_FAILED_RETENTION_HOURS
            ),
        });
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.level) {
        return Err(ConfigError::Validation {
            message: format!("Invalid logging.level '{}': {}", config.logging.level, e),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.ocr.program, "python3");
        assert_eq!(config.ocr.max_output_bytes, 20 * 1024 * 1024);
        assert_eq!(config.queue.stale_after_secs, 1800);
        assert_eq!(config.queue.failed_retention_hours, 72);
        assert!(config.upload_directory.ends_with("pdf_queue"));
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "version": "1.0",
            "database_path": "/var/lib/voterroll/voterroll.db",
            "upload_directory": "/var/lib/voterroll/uploads",
            "server": { "host": "0.0.0.0", "port": 9000, "max_upload_bytes": 1048576 },
            "ocr": { "program": "/opt/ocr/bin/parse", "args": [], "timeout_secs": 60, "max_output_bytes": 4096 },
            "queue": { "heartbeat_secs": 10, "stale_after_secs": 120, "retain_completed_files": true },
            "logging": { "level": "voterroll=debug", "json": true }
        }"#;
        let config = load_config_from_str(json).unwrap();
        assert_eq!(config.server.port, 9000);
        assert!(config.ocr.args.is_empty());
        assert_eq!(config.queue.stale_after_secs, 120);
        assert!(config.queue.retain_completed_files);
        assert!(config.logging.json);
        assert_eq!(
            config.resolved_database_path(),
            std::path::PathBuf::from("/var/lib/voterroll/voterroll.db")
        );
    }

    #[test]
    fn test_unknown_field_fails_schema() {
        let err = load_config_from_str(r#"{ "workers": 4 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_wrong_version_fails_schema() {
        let err = load_config_from_str(r#"{ "version": "2.0" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_heartbeat_must_be_below_staleness() {
        let json = r#"{ "queue": { "heartbeat_secs": 30, "stale_after_secs": 30 } }"#;
        let err = load_config_from_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_staleness_window_is_always_enforced() {
        let mut config = Config::default();
        config.queue.stale_after_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_queue_windows_are_capped() {
        let mut config = Config::default();
        config.queue.stale_after_secs = MAX_STALE_AFTER_SECS + 1;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.queue.failed_retention_hours = u64::MAX;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("failed_retention_hours"));

        let mut config = Config::default();
        config.queue.stale_after_secs = MAX_STALE_AFTER_SECS;
        config.queue.failed_retention_hours = MAX_FAILED_RETENTION_HOURS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_blank_program_rejected() {
        let mut config = Config::default();
        config.ocr.program = "   ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_json() {
        let err = load_config_from_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
