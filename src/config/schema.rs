use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "server": {
                "type": "object",
                "properties": {
                    "host": { "type": "string" },
                    "port": { "type": "integer", "minimum": 1, "maximum": 65535 }
                }
            },
            "storage": {
                "type": "object",
                "properties": {
                    "database": { "type": "string" },
                    "max_retries": { "type": "integer", "minimum": 0 },
                    "retry_base_delay_ms": { "type": "integer", "minimum": 1 }
                }
            },
            "scheduler": {
                "type": "object",
                "properties": {
                    "enabled": { "type": "boolean" },
                    "interval_secs": { "type": "integer", "minimum": 1 }
                }
            },
            "runner": {
                "type": "object",
                "properties": {
                    "max_concurrent_jobs": { "type": "integer", "minimum": 1 },
                    "tool_timeout_secs": { "type": "integer", "minimum": 1 },
                    "cancel_grace_secs": { "type": "integer", "minimum": 0 },
                    "subscriber_lag_limit": { "type": "integer", "minimum": 0 },
                    "log_flush_lines": { "type": "integer", "minimum": 1 }
                }
            },
            "tools": {
                "type": "object",
                "properties": {
                    "nmap": { "$ref": "#/$defs/executable" },
                    "nuclei": { "$ref": "#/$defs/executable" },
                    "nikto": { "$ref": "#/$defs/executable" },
                    "wpscan": { "$ref": "#/$defs/executable" },
                    "wpscan_api_token": { "type": "string" },
                    "wpscan_require_token": { "type": "boolean" }
                }
            }
        },
        "$defs": {
            "executable": { "type": "string", "minLength": 1 }
        }
    })
});
