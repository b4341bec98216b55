use serde::{Deserialize, Serialize};

/// Named stage of a multi-step penetration test.
///
/// Ordering matters: the orchestrator only ever moves forward through this
/// sequence, and only on an explicit transition from the decision provider.
/// `Reporting` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Reconnaissance,
    Enumeration,
    VulnerabilityAssessment,
    Exploitation,
    PostExploitation,
    LateralMovement,
    Persistence,
    Exfiltration,
    Reporting,
}

impl TestPhase {
    pub const ALL: [TestPhase; 9] = [
        TestPhase::Reconnaissance,
        TestPhase::Enumeration,
        TestPhase::VulnerabilityAssessment,
        TestPhase::Exploitation,
        TestPhase::PostExploitation,
        TestPhase::LateralMovement,
        TestPhase::Persistence,
        TestPhase::Exfiltration,
        TestPhase::Reporting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestPhase::Reconnaissance => "reconnaissance",
            TestPhase::Enumeration => "enumeration",
            TestPhase::VulnerabilityAssessment => "vulnerability_assessment",
            TestPhase::Exploitation => "exploitation",
            TestPhase::PostExploitation => "post_exploitation",
            TestPhase::LateralMovement => "lateral_movement",
            TestPhase::Persistence => "persistence",
            TestPhase::Exfiltration => "exfiltration",
            TestPhase::Reporting => "reporting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TestPhase::Reporting)
    }
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_round_trip_through_strings() {
        for phase in TestPhase::ALL {
            assert_eq!(TestPhase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(TestPhase::parse("warp_drive"), None);
    }

    #[test]
    fn phase_order_is_monotonic() {
        assert!(TestPhase::Reconnaissance < TestPhase::Enumeration);
        assert!(TestPhase::Exploitation < TestPhase::Reporting);
        assert!(TestPhase::Reporting.is_terminal());
    }
}
