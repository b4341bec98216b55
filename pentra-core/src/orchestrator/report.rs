//! Final report synthesis for an orchestration session.

use chrono::Utc;
use serde_json::Value;

use pentra_model::{
    PentestContext, PentestReport, ReportFinding, RiskAssessment, RiskLevel, Severity,
};

/// Risk derived from what was actually found: any critical vulnerability or
/// any successful exploit is `Critical`; more than two highs is `High`; any
/// high is `Medium`; otherwise `Low`.
pub fn assess_risk(ctx: &PentestContext) -> RiskAssessment {
    let critical_findings = ctx
        .identified_vulnerabilities
        .iter()
        .filter(|vuln| vuln.severity.eq_ignore_ascii_case("critical"))
        .count();
    let high_findings = ctx
        .identified_vulnerabilities
        .iter()
        .filter(|vuln| vuln.severity.eq_ignore_ascii_case("high"))
        .count();

    let overall_risk = if critical_findings > 0 || !ctx.successful_exploits.is_empty() {
        RiskLevel::Critical
    } else if high_findings > 2 {
        RiskLevel::High
    } else if high_findings > 0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskAssessment {
        overall_risk,
        critical_findings,
        high_findings,
        exploitable_vulnerabilities: ctx.successful_exploits.len(),
    }
}

/// Flatten vulnerabilities and successful exploits into report rows with
/// estimated severity scores.
pub fn compile_findings(ctx: &PentestContext) -> Vec<ReportFinding> {
    let mut findings = Vec::new();

    for vuln in &ctx.identified_vulnerabilities {
        let severity = Severity::parse_lossy(&vuln.severity);
        findings.push(ReportFinding {
            title: vuln.template.clone(),
            severity,
            description: format!("Vulnerability found at {}", vuln.host),
            evidence: Value::String(vuln.matched_at.clone().unwrap_or_default()),
            estimated_score: severity.estimated_score(),
        });
    }

    for exploit in &ctx.successful_exploits {
        findings.push(ReportFinding {
            title: format!("Successful Exploitation - {}", exploit.exploit),
            severity: Severity::Critical,
            description: format!(
                "Successfully exploited target {}",
                exploit.target.as_deref().unwrap_or("unknown")
            ),
            evidence: Value::String(exploit.result.clone()),
            estimated_score: Severity::Critical.estimated_score(),
        });
    }

    findings
}

pub fn build_report(ctx: &PentestContext, executive_summary: String) -> PentestReport {
    let generated_at = Utc::now();
    let test_duration_secs = ctx
        .target_info
        .start_time
        .map(|start| (generated_at - start).num_seconds());

    PentestReport {
        engagement_id: ctx.engagement_id,
        generated_at,
        test_duration_secs,
        executive_summary,
        risk: assess_risk(ctx),
        services_discovered: ctx.discovered_services.clone(),
        vulnerabilities: ctx.identified_vulnerabilities.clone(),
        successful_exploits: ctx.successful_exploits.clone(),
        credentials_compromised: ctx.credentials_found.len(),
        findings: compile_findings(ctx),
        command_log: ctx.command_history.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pentra_model::{ExploitRecord, IdentifiedVulnerability};
    use serde_json::Map;
    use uuid::Uuid;

    fn vuln(severity: &str) -> IdentifiedVulnerability {
        IdentifiedVulnerability {
            template: "tmpl".into(),
            severity: severity.into(),
            host: "h".into(),
            matched_at: None,
            info: Map::new(),
        }
    }

    fn ctx() -> PentestContext {
        PentestContext::new(Uuid::new_v4(), vec!["t".into()], Map::new())
    }

    #[test]
    fn exploit_always_means_critical_risk() {
        let mut ctx = ctx();
        ctx.successful_exploits.push(ExploitRecord {
            timestamp: Utc::now(),
            target: Some("t".into()),
            exploit: "cve-xxxx".into(),
            result: "shell".into(),
        });
        assert_eq!(assess_risk(&ctx).overall_risk, RiskLevel::Critical);
    }

    #[test]
    fn risk_tiers_follow_high_severity_counts() {
        let mut ctx = ctx();
        assert_eq!(assess_risk(&ctx).overall_risk, RiskLevel::Low);

        ctx.identified_vulnerabilities.push(vuln("high"));
        assert_eq!(assess_risk(&ctx).overall_risk, RiskLevel::Medium);

        ctx.identified_vulnerabilities.push(vuln("HIGH"));
        ctx.identified_vulnerabilities.push(vuln("high"));
        assert_eq!(assess_risk(&ctx).overall_risk, RiskLevel::High);

        ctx.identified_vulnerabilities.push(vuln("critical"));
        assert_eq!(assess_risk(&ctx).overall_risk, RiskLevel::Critical);
    }

    #[test]
    fn findings_carry_severity_scores() {
        let mut ctx = ctx();
        ctx.identified_vulnerabilities.push(vuln("medium"));
        ctx.successful_exploits.push(ExploitRecord {
            timestamp: Utc::now(),
            target: None,
            exploit: "manual".into(),
            result: "session opened".into(),
        });

        let findings = compile_findings(&ctx);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].estimated_score, 5.0);
        assert_eq!(findings[1].estimated_score, 9.5);
        assert_eq!(findings[1].severity, Severity::Critical);
    }
}
