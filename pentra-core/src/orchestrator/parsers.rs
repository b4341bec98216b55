//! Phase-specific tool output parsers.
//!
//! Tool output is line-oriented text from heterogeneous scanners; every
//! parser here is best-effort and infallible — unparseable lines are simply
//! skipped so one garbled record never costs an iteration.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use pentra_model::{CredentialRecord, DiscoveredService, IdentifiedVulnerability};

static NMAP_OPEN_PORT: LazyLock<Regex> = LazyLock::new(|| {
    // e.g. `80/tcp   open  http` from plain nmap output.
    Regex::new(r"(?m)^\s*(\d{1,5})/(tcp|udp)\s+open\s*(\S*)").expect("static regex")
});

/// Open ports/services from plain nmap output.
pub fn parse_nmap_services(output: &str) -> Vec<DiscoveredService> {
    NMAP_OPEN_PORT
        .captures_iter(output)
        .filter_map(|caps| {
            let port: u16 = caps[1].parse().ok()?;
            let service = caps
                .get(3)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or("unknown");
            Some(DiscoveredService {
                port,
                protocol: caps[2].to_string(),
                state: "open".to_string(),
                service: service.to_string(),
            })
        })
        .collect()
}

/// Domain names from one-per-line enumeration output (dnsx, subfinder).
pub fn parse_dns_domains(output: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || !line.contains('.') {
            continue;
        }
        let domain = line.split_whitespace().next().unwrap_or_default();
        if !domain.is_empty() && !domains.iter().any(|known| known == domain) {
            domains.push(domain.to_string());
        }
    }
    domains
}

/// Vulnerability records from nuclei JSON-lines output. Non-JSON lines and
/// malformed records are skipped.
pub fn parse_nuclei_vulns(output: &str) -> Vec<IdentifiedVulnerability> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if !line.starts_with('{') {
                return None;
            }
            let record: Value = serde_json::from_str(line).ok()?;
            Some(IdentifiedVulnerability {
                template: record
                    .get("template-id")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                severity: record
                    .get("severity")
                    .or_else(|| record.get("info").and_then(|info| info.get("severity")))
                    .and_then(Value::as_str)
                    .unwrap_or("info")
                    .to_string(),
                host: record
                    .get("host")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                matched_at: record
                    .get("matched-at")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                info: record
                    .get("info")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Session/shell markers in exploitation output.
pub fn has_exploit_marker(output: &str) -> bool {
    let lowered = output.to_ascii_lowercase();
    lowered.contains("session") || lowered.contains("shell")
}

/// `user:secret` style lines that mention passwords or hashes.
pub fn parse_credentials(output: &str) -> Vec<CredentialRecord> {
    let mut credentials = Vec::new();
    for line in output.lines() {
        let lowered = line.to_ascii_lowercase();
        if !line.contains(':') || (!lowered.contains("password") && !lowered.contains("hash")) {
            continue;
        }
        let mut parts = line.splitn(2, ':');
        let (Some(username), Some(credential)) = (parts.next(), parts.next()) else {
            continue;
        };
        let username = username.trim();
        let credential = credential.trim();
        if username.is_empty() || credential.is_empty() {
            continue;
        }
        credentials.push(CredentialRecord {
            kind: if lowered.contains("hash") {
                "hash".to_string()
            } else {
                "password".to_string()
            },
            username: username.to_string(),
            credential: credential.to_string(),
            source: "post_exploitation".to_string(),
        });
    }
    credentials
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmap_parser_extracts_open_ports_only() {
        let output = "\
Starting Nmap 7.94\n\
PORT     STATE    SERVICE\n\
22/tcp   open     ssh\n\
80/tcp   open     http\n\
443/tcp  closed   https\n\
8080/tcp filtered http-proxy\n\
53/udp   open     domain\n";
        let services = parse_nmap_services(output);
        assert_eq!(services.len(), 3);
        assert_eq!(services[0].port, 22);
        assert_eq!(services[0].service, "ssh");
        assert_eq!(services[2].protocol, "udp");
        assert!(services.iter().all(|service| service.state == "open"));
    }

    #[test]
    fn dns_parser_skips_comments_and_dedups() {
        let output = "# subfinder results\napi.example.com\nwww.example.com [A 1.2.3.4]\napi.example.com\nnotadomain\n";
        let domains = parse_dns_domains(output);
        assert_eq!(domains, vec!["api.example.com", "www.example.com"]);
    }

    #[test]
    fn nuclei_parser_reads_json_lines_and_skips_noise() {
        let output = concat!(
            "[INF] templates loaded\n",
            r#"{"template-id":"tls-version","severity":"low","host":"https://a.example","matched-at":"https://a.example:443"}"#,
            "\n",
            "{not valid json\n",
            r#"{"template-id":"exposed-panel","info":{"severity":"high"},"host":"https://b.example"}"#,
            "\n",
        );
        let vulns = parse_nuclei_vulns(output);
        assert_eq!(vulns.len(), 2);
        assert_eq!(vulns[0].template, "tls-version");
        assert_eq!(vulns[0].severity, "low");
        assert_eq!(
            vulns[0].matched_at.as_deref(),
            Some("https://a.example:443")
        );
        assert_eq!(vulns[1].severity, "high");
    }

    #[test]
    fn exploit_markers_are_case_insensitive() {
        assert!(has_exploit_marker("Meterpreter SESSION 1 opened"));
        assert!(has_exploit_marker("spawned a reverse shell"));
        assert!(!has_exploit_marker("exploit failed: target patched"));
    }

    #[test]
    fn credential_parser_reads_key_value_lines() {
        let output = "\
dumping secrets\n\
admin password: hunter2\n\
svc_backup hash: aad3b435b51404ee\n\
unrelated line\n";
        let creds = parse_credentials(output);
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].kind, "password");
        assert_eq!(creds[0].username, "admin password");
        assert_eq!(creds[0].credential, "hunter2");
        assert_eq!(creds[1].kind, "hash");
    }
}
