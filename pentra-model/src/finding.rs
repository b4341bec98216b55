use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ids::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Case-insensitive parse; unknown strings map to `Info` so a misbehaving
    /// tool adapter can never drop a finding on the floor.
    pub fn parse_lossy(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }

    /// Estimated CVSS base score used in synthesized reports.
    pub fn estimated_score(&self) -> f64 {
        match self {
            Severity::Critical => 9.5,
            Severity::High => 7.5,
            Severity::Medium => 5.0,
            Severity::Low => 3.0,
            Severity::Info => 0.0,
        }
    }
}

/// A structured, deduplicated security observation attached to a run.
///
/// `duplicate_of` is an id back-reference for dedup bookkeeping, resolved via
/// lookup; it never owns the referenced finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub run_id: Uuid,
    pub engagement_id: Uuid,
    pub job_id: Option<Uuid>,
    pub title: String,
    pub category: String,
    pub severity: Severity,
    pub description: String,
    pub evidence: Value,
    pub affected_hosts: Vec<String>,
    pub affected_urls: Vec<String>,
    pub hash: String,
    pub false_positive: bool,
    pub duplicate_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Finding {
    /// Compute and stamp the dedup hash from the identity fields.
    pub fn with_hash(mut self) -> Self {
        self.hash = finding_hash(
            &self.title,
            &self.category,
            self.severity,
            &self.affected_hosts,
            &self.affected_urls,
        );
        self
    }
}

/// Deterministic dedup hash over a finding's identity.
///
/// `sha256("title:category:severity[:sorted_hosts][:sorted_urls]")`,
/// truncated to 16 hex chars. Host/url lists are sorted so ordering in tool
/// output cannot defeat deduplication.
pub fn finding_hash(
    title: &str,
    category: &str,
    severity: Severity,
    affected_hosts: &[String],
    affected_urls: &[String],
) -> String {
    let mut input = format!("{}:{}:{}", title, category, severity.as_str());
    if !affected_hosts.is_empty() {
        let mut hosts = affected_hosts.to_vec();
        hosts.sort();
        input.push(':');
        input.push_str(&hosts.join(","));
    }
    if !affected_urls.is_empty() {
        let mut urls = affected_urls.to_vec();
        urls.sort();
        input.push(':');
        input.push_str(&urls.join(","));
    }
    let digest = Sha256::digest(input.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

/// Opaque evidence blob reference uploaded by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub run_id: Uuid,
    pub job_id: Uuid,
    pub kind: String,
    pub label: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_is_case_insensitive_and_lossy() {
        assert_eq!(Severity::parse_lossy("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse_lossy("High"), Severity::High);
        assert_eq!(Severity::parse_lossy("informational"), Severity::Info);
        assert_eq!(Severity::parse_lossy("garbage"), Severity::Info);
    }

    #[test]
    fn hash_is_order_independent_for_hosts() {
        let a = finding_hash(
            "SQLi",
            "injection",
            Severity::High,
            &["b.example".into(), "a.example".into()],
            &[],
        );
        let b = finding_hash(
            "SQLi",
            "injection",
            Severity::High,
            &["a.example".into(), "b.example".into()],
            &[],
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn hash_varies_with_identity_fields() {
        let base = finding_hash("XSS", "xss", Severity::Medium, &[], &[]);
        assert_ne!(base, finding_hash("XSS", "xss", Severity::High, &[], &[]));
        assert_ne!(base, finding_hash("XSS2", "xss", Severity::Medium, &[], &[]));
    }
}
