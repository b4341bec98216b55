//! Prompt construction for the decision provider.

use pentra_model::{PentestContext, TestPhase};

/// Phase-specific guidance embedded in every decision prompt.
fn phase_guidance(phase: TestPhase) -> &'static str {
    match phase {
        TestPhase::Reconnaissance => {
            "We are in the reconnaissance phase. Analyze the targets and gather initial \
             information. Suggest commands for DNS enumeration, port scanning, service \
             detection, and subdomain discovery. Available tools: nmap, dnsx, httpx, subfinder."
        }
        TestPhase::Enumeration => {
            "We are in the enumeration phase. Deep dive into discovered services. Suggest \
             commands for service version detection, banner grabbing, and directory \
             enumeration. Available tools: nmap scripts, gobuster, ffuf, nikto."
        }
        TestPhase::VulnerabilityAssessment => {
            "We are in vulnerability assessment. Identify security issues in discovered \
             services. Suggest commands for vulnerability scanning, configuration review, and \
             known CVE checks. Available tools: nuclei, nmap vuln scripts."
        }
        TestPhase::Exploitation => {
            "We are in the exploitation phase. Attempt to exploit identified vulnerabilities \
             safely; only proceed with non-destructive exploits. Available tools: metasploit, \
             manual techniques."
        }
        TestPhase::PostExploitation => {
            "We are in post-exploitation. Gather evidence and assess impact. Suggest commands \
             for privilege escalation checks, credential harvesting, and system enumeration."
        }
        TestPhase::LateralMovement => {
            "We are exploring lateral movement. Map the internal network and identify pivot \
             points. Suggest commands for network mapping, share enumeration, and trust \
             relationship discovery."
        }
        TestPhase::Persistence | TestPhase::Exfiltration | TestPhase::Reporting => {
            "Analyze the current situation and suggest next steps."
        }
    }
}

/// Context-aware prompt for one orchestrator iteration.
pub fn build_prompt(ctx: &PentestContext) -> String {
    let (services, vulnerabilities, exploits, credentials) = ctx.summary_counts();
    format!(
        "Current phase: {phase}\n\n{guidance}\n\n\
         Recent discoveries:\n\
         - Services found: {services}\n\
         - Vulnerabilities identified: {vulnerabilities}\n\
         - Successful exploits: {exploits}\n\
         - Credentials found: {credentials}\n\n\
         Analyze the current context and provide:\n\
         1. Your reasoning about the current situation\n\
         2. Specific commands to execute next\n\
         3. Whether we should transition to a different phase\n\
         4. Analysis of any critical findings\n\
         5. Current risk assessment\n\n\
         Be methodical, thorough, and always stay inside the authorized scope.",
        phase = ctx.current_phase,
        guidance = phase_guidance(ctx.current_phase),
    )
}

/// Prompt for the closing executive summary.
pub fn summary_prompt(ctx: &PentestContext) -> String {
    let (services, vulnerabilities, exploits, credentials) = ctx.summary_counts();
    format!(
        "Generate an executive summary for a penetration test with these results:\n\
         - {services} services discovered\n\
         - {vulnerabilities} vulnerabilities found\n\
         - {exploits} successful exploits\n\
         - {credentials} credentials compromised\n\n\
         Focus on business impact and high-level risks."
    )
}
