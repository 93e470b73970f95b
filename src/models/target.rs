use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::LanternError;

const MAX_TARGETS: usize = 1024;

/// Characters a target must never contain. Tools are spawned without a shell,
/// but targets also end up in log lines and exported documents.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '|', '&', '$', '`', '<', '>', '(', ')', '{', '}', '\\', '\'', '"', '!', '*',
];

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:[A-Za-z0-9.-]+|\[[A-Fa-f0-9:]+\]|(?:\d{1,3}\.){3}\d{1,3})(?::\d{1,5})?/?$|^[A-Fa-f0-9]*:[A-Fa-f0-9]*:[A-Fa-f0-9:]*$",
    )
    .expect("target pattern is valid")
});

static SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,;]+").expect("split pattern is valid"));

/// Check a single target before it is attached to a job.
pub fn validate_target(target: &str) -> Result<(), LanternError> {
    if target.trim().is_empty() {
        return Err(LanternError::InvalidTarget("target is empty".into()));
    }
    if target.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(LanternError::InvalidTarget(format!(
            "target contains whitespace: {:?}",
            target
        )));
    }
    if let Some(c) = target.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(LanternError::InvalidTarget(format!(
            "target {:?} contains forbidden character '{}'",
            target, c
        )));
    }
    if target.starts_with('-') {
        return Err(LanternError::InvalidTarget(format!(
            "target {:?} looks like a command-line flag",
            target
        )));
    }
    Ok(())
}

pub fn validate_targets(targets: &[String]) -> Result<(), LanternError> {
    if targets.is_empty() {
        return Err(LanternError::InvalidTarget("no targets given".into()));
    }
    if targets.len() > MAX_TARGETS {
        return Err(LanternError::InvalidTarget(format!(
            "too many targets ({} > {})",
            targets.len(),
            MAX_TARGETS
        )));
    }
    targets.iter().try_for_each(|t| validate_target(t))
}

/// Split free-form user input into a de-duplicated, order-preserving target
/// list. Entries that are not a host, IP or http(s) URL are dropped.
pub fn normalize_targets(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    SPLIT_RE
        .split(raw.trim())
        .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|t| !t.is_empty() && TARGET_RE.is_match(t))
        .filter(|t| seen.insert(t.to_string()))
        .take(MAX_TARGETS)
        .map(str::to_string)
        .collect()
}

/// Prefix `http://` unless the target already carries an http(s) scheme.
pub fn ensure_url(target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{}", target)
    }
}

/// Strip scheme and path, leaving host[:port] for network-level tools.
pub fn host_of(target: &str) -> String {
    let without_scheme = target
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(target);
    let host_port = without_scheme.split('/').next().unwrap_or(without_scheme);
    if host_port.starts_with('[') {
        return host_port
            .split(']')
            .next()
            .map(|h| h.trim_start_matches('[').to_string())
            .unwrap_or_else(|| host_port.to_string());
    }
    if host_port.matches(':').count() == 1 {
        return host_port.split(':').next().unwrap_or(host_port).to_string();
    }
    host_port.to_string()
}
