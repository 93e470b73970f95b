use tracing::debug;

/// Resolve a credential value. If the value starts with '$', treat it as an
/// environment variable reference and resolve from the environment.
pub fn resolve_credential(value: &str) -> String {
    resolve_with(value, |name| std::env::var(name).ok())
}

fn resolve_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    match value.strip_prefix('$') {
        Some(var_name) => match lookup(var_name) {
            Some(resolved) => {
                debug!(var = %var_name, "Resolved credential from environment");
                resolved
            }
            None => {
                debug!(var = %var_name, "Credential variable not set");
                String::new()
            }
        },
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_value() {
        assert_eq!(resolve_with("abc123", |_| None), "abc123");
    }

    #[test]
    fn test_env_reference() {
        let resolved = resolve_with("$WP_TOKEN", |name| (name == "WP_TOKEN").then(|| "secret".into()));
        assert_eq!(resolved, "secret");
    }

    #[test]
    fn test_unset_reference_is_empty() {
        assert_eq!(resolve_with("$MISSING", |_| None), "");
    }
}
