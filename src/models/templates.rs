use std::collections::BTreeSet;

use serde::Serialize;

use super::finding::Severity;
use super::policy::{NmapProfile, Policy};

/// A built-in preset that maps a named use case onto a ready policy.
#[derive(Debug, Clone, Serialize)]
pub struct ScanTemplate {
    pub id: &'static str,
    pub title: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub policy: Policy,
}

fn severities(list: &[Severity]) -> BTreeSet<Severity> {
    list.iter().copied().collect()
}

fn preset(
    id: &'static str,
    title: &'static str,
    category: &'static str,
    description: &'static str,
    policy: Policy,
) -> ScanTemplate {
    ScanTemplate {
        id,
        title,
        category,
        description,
        policy: Policy { name: title.to_string(), ..policy },
    }
}

pub fn builtin_templates() -> Vec<ScanTemplate> {
    let default_sev = severities(&[Severity::Critical, Severity::High, Severity::Medium]);
    vec![
        preset(
            "attack_surface",
            "Attack Surface Discovery",
            "Discovery",
            "Template scanner enumeration of exposures on web-facing services.",
            Policy {
                use_nmap: false,
                use_nuclei: true,
                nuclei_severities: default_sev.clone(),
                ..Default::default()
            },
        ),
        preset(
            "host_discovery",
            "Host Discovery",
            "Discovery",
            "Top ports with service detection.",
            Policy {
                use_nmap: true,
                nmap_profile: NmapProfile::Discovery,
                use_nuclei: false,
                ..Default::default()
            },
        ),
        preset(
            "basic_network",
            "Basic Network Scan",
            "Vulnerabilities",
            "Full TCP sweep with service detection.",
            Policy {
                use_nmap: true,
                nmap_profile: NmapProfile::Full,
                use_nuclei: false,
                ..Default::default()
            },
        ),
        preset(
            "advanced_dynamic",
            "Advanced Dynamic Scan",
            "Vulnerabilities",
            "Vulnerability scripts plus critical/high templates.",
            Policy {
                use_nmap: true,
                nmap_profile: NmapProfile::Vuln,
                use_nuclei: true,
                nuclei_severities: severities(&[Severity::Critical, Severity::High]),
                ..Default::default()
            },
        ),
        preset(
            "web_app_tests",
            "Web Application Tests",
            "Web App",
            "Templates and web-server audit for common web vulnerabilities.",
            Policy {
                use_nmap: false,
                use_nuclei: true,
                nuclei_severities: default_sev.clone(),
                use_nikto: true,
                ..Default::default()
            },
        ),
        preset(
            "wordpress_audit",
            "WordPress Audit",
            "Web App",
            "CMS audit with template checks (API token recommended).",
            Policy {
                use_nmap: false,
                use_nuclei: true,
                nuclei_severities: default_sev,
                use_wpscan: true,
                ..Default::default()
            },
        ),
    ]
}

pub fn find_template(id: &str) -> Option<ScanTemplate> {
    builtin_templates().into_iter().find(|t| t.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolKind;

    #[test]
    fn test_all_templates_valid() {
        let templates = builtin_templates();
        assert_eq!(templates.len(), 6);
        for template in &templates {
            assert!(template.policy.validate().is_ok(), "{} invalid", template.id);
            assert_eq!(template.policy.name, template.title);
        }
    }

    #[test]
    fn test_wordpress_template_enables_cms_auditor() {
        let wp = find_template("wordpress_audit").unwrap();
        assert!(wp.policy.is_enabled(ToolKind::Wpscan));
        assert!(find_template("nope").is_none());
    }
}
