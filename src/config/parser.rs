use std::path::Path;
use crate::errors::LanternError;
use super::types::LanternConfig;
use super::security::validate_security_patterns;
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

pub async fn parse_config(path: &Path) -> Result<LanternConfig, LanternError> {
    if !path.exists() {
        return Err(LanternError::Configuration(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(LanternError::Configuration("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<LanternConfig, LanternError> {
    if content.trim().is_empty() {
        return Ok(LanternConfig::default());
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    // Security pattern validation
    validate_security_patterns(&yaml)?;

    // JSON Schema validation
    validate_schema(&yaml)?;

    // Parse into typed config
    let config: LanternConfig = serde_yaml::from_value(yaml)?;

    // Semantic checks
    validate_limits(&config)?;

    Ok(config)
}

/// Load the config file if given, otherwise defaults, then apply environment overrides.
pub async fn load_config(path: Option<&Path>) -> Result<LanternConfig, LanternError> {
    let mut config = match path {
        Some(path) => parse_config(path).await?,
        None => LanternConfig::default(),
    };
    config.apply_env_overrides();
    validate_limits(&config)?;
    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), LanternError> {
    // Convert YAML value to JSON for schema validation
    let json_str = serde_json::to_string(yaml)
        .map_err(|e| LanternError::Configuration(format!("Config conversion error: {}", e)))?;
    let json_value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| LanternError::Configuration(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| LanternError::Configuration(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        // Advisory: typed parsing and the semantic checks below are authoritative
        for e in errors {
            warn!(validation_error = %e, path = %e.instance_path, "Config schema warning");
        }
    }

    Ok(())
}

fn validate_limits(config: &LanternConfig) -> Result<(), LanternError> {
    let zero_checks = [
        (config.scheduler.interval_secs == 0, "scheduler.interval_secs"),
        (config.runner.max_concurrent_jobs == 0, "runner.max_concurrent_jobs"),
        (config.runner.tool_timeout_secs == 0, "runner.tool_timeout_secs"),
        (config.runner.log_flush_lines == 0, "runner.log_flush_lines"),
        (config.storage.retry_base_delay_ms == 0, "storage.retry_base_delay_ms"),
    ];
    if let Some((_, field)) = zero_checks.iter().find(|(is_zero, _)| *is_zero) {
        return Err(LanternError::Configuration(format!("{} must be greater than zero", field)));
    }
    if config.storage.database.trim().is_empty() {
        return Err(LanternError::Configuration("storage.database must not be empty".into()));
    }
    if config.tools.wpscan_require_token
        && config.tools.wpscan_api_token.is_none()
    {
        warn!("tools.wpscan_require_token is set but no token is configured; WPScan will be refused");
    }
    Ok(())
}
