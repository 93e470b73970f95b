use std::path::{Path, PathBuf};

use data_encoding::BASE64;

use crate::models::{ensure_url, host_of, Policy, ToolKind};

/// Flags whose following value must never appear in the live log.
const SECRET_FLAGS: &[&str] = &["--api-token", "-id"];

/// One process launch: program, argument vector, and the targets it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub targets: Vec<String>,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    /// Command line as shown to users, with credentials masked.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                parts.push("***".to_string());
                mask_next = false;
                continue;
            }
            if SECRET_FLAGS.contains(&arg.as_str()) {
                mask_next = true;
                parts.push(arg.clone());
            } else if arg.to_ascii_lowercase().starts_with("authorization:") {
                parts.push("\"Authorization: ***\"".to_string());
            } else if arg.contains(char::is_whitespace) {
                parts.push(format!("\"{}\"", arg));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Extra inputs to argument construction that do not live on the policy.
#[derive(Debug, Clone, Default)]
pub struct CommandContext<'a> {
    pub wpscan_api_token: Option<&'a str>,
}

/// Translate a policy into the concrete launches for one tool.
///
/// The network scanner and template scanner take every target in a single
/// launch; the web-server and CMS auditors are launched once per target.
pub fn build_invocations(
    tool: ToolKind,
    program: &Path,
    targets: &[String],
    policy: &Policy,
    ctx: &CommandContext<'_>,
) -> Vec<Invocation> {
    match tool {
        ToolKind::Nmap => vec![Invocation {
            targets: targets.to_vec(),
            program: program.to_path_buf(),
            args: nmap_args(targets, policy),
        }],
        ToolKind::Nuclei => vec![Invocation {
            targets: targets.to_vec(),
            program: program.to_path_buf(),
            args: nuclei_args(targets, policy),
        }],
        ToolKind::Nikto => targets
            .iter()
            .map(|t| Invocation {
                targets: vec![t.clone()],
                program: program.to_path_buf(),
                args: nikto_args(t, policy),
            })
            .collect(),
        ToolKind::Wpscan => targets
            .iter()
            .map(|t| Invocation {
                targets: vec![t.clone()],
                program: program.to_path_buf(),
                args: wpscan_args(t, policy, ctx.wpscan_api_token),
            })
            .collect(),
    }
}

fn nmap_args(targets: &[String], policy: &Policy) -> Vec<String> {
    let mut args: Vec<String> = policy
        .nmap_profile
        .args()
        .iter()
        .map(|a| a.to_string())
        .collect();
    if let Some(rate) = policy.rate_limit {
        args.push("--max-rate".into());
        args.push(rate.to_string());
    }
    let mut hosts: Vec<String> = Vec::with_capacity(targets.len());
    for host in targets.iter().map(|t| host_of(t)) {
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    args.extend(hosts);
    args
}

fn nuclei_args(targets: &[String], policy: &Policy) -> Vec<String> {
    let mut args = Vec::new();
    for target in targets {
        args.push("-u".into());
        args.push(ensure_url(target));
    }
    args.push("-severity".into());
    args.push(policy.severity_list());
    args.push("-jsonl".into());
    args.push("-silent".into());
    if let Some(rate) = policy.rate_limit {
        args.push("-rl".into());
        args.push(rate.to_string());
    }
    if let Some(auth) = &policy.basic_auth {
        let token = BASE64.encode(format!("{}:{}", auth.user, auth.pass).as_bytes());
        args.push("-H".into());
        args.push(format!("Authorization: Basic {}", token));
    }
    args
}

fn nikto_args(target: &str, policy: &Policy) -> Vec<String> {
    let mut args = vec![
        "-host".to_string(),
        ensure_url(target),
        "-ask".to_string(),
        "no".to_string(),
    ];
    if let Some(auth) = &policy.basic_auth {
        args.push("-id".into());
        args.push(format!("{}:{}", auth.user, auth.pass));
    }
    args
}

fn wpscan_args(target: &str, policy: &Policy, token: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--url".to_string(),
        ensure_url(target),
        "--no-update".to_string(),
        "--format".to_string(),
        "json".to_string(),
    ];
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        args.push("--api-token".into());
        args.push(token.to_string());
    }
    if let Some(rate) = policy.rate_limit {
        // requests per second -> milliseconds between requests
        args.push("--throttle".into());
        args.push((1000 / rate.max(1)).to_string());
    }
    args.push("--max-threads".into());
    args.push(policy.concurrency.max(1).to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BasicAuth, Severity};

    fn targets(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nmap_single_invocation_with_hosts() {
        let policy = Policy { rate_limit: Some(100), ..Default::default() };
        let invs = build_invocations(
            ToolKind::Nmap,
            Path::new("nmap"),
            &targets(&["10.0.0.5", "https://example.com/app", "example.com"]),
            &policy,
            &CommandContext::default(),
        );
        assert_eq!(invs.len(), 1);
        let args = &invs[0].args;
        assert!(args.ends_with(&["10.0.0.5".to_string(), "example.com".to_string()]));
        assert!(args.windows(2).any(|w| w == ["--max-rate", "100"]));
        assert!(args.contains(&"vuln".to_string()));
    }

    #[test]
    fn test_nuclei_flags() {
        let policy = Policy {
            nuclei_severities: [Severity::High, Severity::Critical].into_iter().collect(),
            basic_auth: Some(BasicAuth { user: "admin".into(), pass: "pw".into() }),
            rate_limit: Some(50),
            ..Default::default()
        };
        let invs = build_invocations(
            ToolKind::Nuclei,
            Path::new("nuclei"),
            &targets(&["a.com", "https://b.com"]),
            &policy,
            &CommandContext::default(),
        );
        assert_eq!(invs.len(), 1);
        let args = &invs[0].args;
        assert_eq!(&args[..4], &["-u", "http://a.com", "-u", "https://b.com"]);
        assert!(args.windows(2).any(|w| w == ["-severity", "critical,high"]));
        assert!(args.windows(2).any(|w| w == ["-rl", "50"]));
        assert!(args.contains(&"Authorization: Basic YWRtaW46cHc=".to_string()));
        assert!(!invs[0].display().contains("YWRtaW46cHc="));
    }

    #[test]
    fn test_per_target_tools_split() {
        let policy = Policy { use_nikto: true, ..Default::default() };
        let invs = build_invocations(
            ToolKind::Nikto,
            Path::new("nikto"),
            &targets(&["a.com", "b.com"]),
            &policy,
            &CommandContext::default(),
        );
        assert_eq!(invs.len(), 2);
        assert_eq!(invs[1].targets, vec!["b.com"]);
        assert_eq!(invs[1].args[..2], ["-host", "http://b.com"]);
    }

    #[test]
    fn test_wpscan_token_redacted() {
        let policy = Policy { use_wpscan: true, rate_limit: Some(4), concurrency: 3, ..Default::default() };
        let ctx = CommandContext { wpscan_api_token: Some("s3cret") };
        let invs = build_invocations(ToolKind::Wpscan, Path::new("wpscan"), &targets(&["wp.io"]), &policy, &ctx);
        let args = &invs[0].args;
        assert!(args.windows(2).any(|w| w == ["--api-token", "s3cret"]));
        assert!(args.windows(2).any(|w| w == ["--throttle", "250"]));
        assert!(args.windows(2).any(|w| w == ["--max-threads", "3"]));
        let shown = invs[0].display();
        assert!(shown.contains("--api-token ***"));
        assert!(!shown.contains("s3cret"));
    }
}
