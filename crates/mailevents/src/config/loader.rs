use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};

use crate::config::schema::Settings;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/settings-v1.json");

/// Environment variable naming the settings file.
pub const CONFIG_ENV_VAR: &str = "MAILEVENTS_CONFIG";

/// Returns the settings path from `MAILEVENTS_CONFIG`, if set.
pub fn settings_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(|p| PathBuf::from(crate::secrets::expand_home(p.trim())))
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let settings: Settings = serde_json::from_value(json_value)?;

    validate_settings(&settings)?;

    Ok(settings)
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

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported settings version: {}", settings.version),
        });
    }

    for format in &settings.date_formats {
        validate_date_format(format)?;
    }

    if let Some(seed) = &settings.mailbox {
        if seed.port == 0 {
            return Err(ConfigError::Validation {
                message: "mailbox.port must be between 1 and 65535".to_string(),
            });
        }
    }

    Ok(())
}

/// Rejects strftime strings chrono cannot parse, and formats that carry no
/// date component at all.
fn validate_date_format(format: &str) -> Result<(), ConfigError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();

    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidDateFormat {
            format: format.to_string(),
            reason: "unrecognized specifier".to_string(),
        });
    }

    if !format.contains("%d") && !format.contains("%e") && !format.contains("%F") {
        return Err(ConfigError::InvalidDateFormat {
            format: format.to_string(),
            reason: "format has no day-of-month".to_string(),
        });
    }

    Ok(())
}
