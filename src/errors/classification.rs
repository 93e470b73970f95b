use super::types::LanternError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl LanternError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            LanternError::Storage(_) => ErrorClassification {
                error_type: "StorageError",
                retryable: true,
            },
            LanternError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
            },
            LanternError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: true,
            },

            // Non-retryable errors
            LanternError::Configuration(_) => ErrorClassification {
                error_type: "ConfigurationError",
                retryable: false,
            },
            LanternError::InvalidPolicy(_) => ErrorClassification {
                error_type: "InvalidPolicy",
                retryable: false,
            },
            LanternError::InvalidTarget(_) => ErrorClassification {
                error_type: "InvalidTarget",
                retryable: false,
            },
            LanternError::NotFound(_) => ErrorClassification {
                error_type: "NotFound",
                retryable: false,
            },
            LanternError::ToolUnavailable(_) => ErrorClassification {
                error_type: "ToolUnavailable",
                retryable: false,
            },
            LanternError::ToolExecution(_) => ErrorClassification {
                error_type: "ToolExecutionFailure",
                retryable: false,
            },
            LanternError::Parse(_) => ErrorClassification {
                error_type: "ParseError",
                retryable: false,
            },
            LanternError::Cron(_) => ErrorClassification {
                error_type: "CronError",
                retryable: false,
            },
            LanternError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
            },
            LanternError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },
            LanternError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
            },
        }
    }

    /// True for errors raised before a job exists (bad policy, targets or
    /// configuration). These are the only errors `create_job` returns.
    pub fn is_configuration_time(&self) -> bool {
        matches!(
            self,
            LanternError::Configuration(_)
                | LanternError::InvalidPolicy(_)
                | LanternError::InvalidTarget(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_is_retryable() {
        let class = LanternError::Storage("disk full".into()).classify();
        assert_eq!(class.error_type, "StorageError");
        assert!(class.retryable);
    }

    #[test]
    fn test_policy_errors_not_retryable() {
        assert!(!LanternError::InvalidPolicy("no tools".into()).classify().retryable);
        assert!(!LanternError::Configuration("token".into()).classify().retryable);
        assert!(!LanternError::NotFound("job".into()).classify().retryable);
    }

    #[test]
    fn test_configuration_time_errors() {
        assert!(LanternError::InvalidTarget("".into()).is_configuration_time());
        assert!(LanternError::InvalidPolicy("".into()).is_configuration_time());
        assert!(!LanternError::Storage("".into()).is_configuration_time());
        assert!(!LanternError::ToolUnavailable("nmap".into()).is_configuration_time());
    }

    #[test]
    fn test_rusqlite_error_maps_to_storage() {
        let err: LanternError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, LanternError::Storage(_)));
    }
}
