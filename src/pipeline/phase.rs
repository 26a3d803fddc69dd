use super::state::ScanPhase;
use crate::config::ScanConfig;

pub struct PhaseDefinition {
    pub phase: ScanPhase,
    pub display_name: &'static str,
    pub description: &'static str,
    pub optional: bool,
}

pub static PHASES: &[PhaseDefinition] = &[
    PhaseDefinition {
        phase: ScanPhase::Init,
        display_name: "Initialization",
        description: "Validate the target and check required tool binaries",
        optional: false,
    },
    PhaseDefinition {
        phase: ScanPhase::SubdomainEnum,
        display_name: "Subdomain Enumeration",
        description: "Passive subdomain sources followed by liveness probes",
        optional: false,
    },
    PhaseDefinition {
        phase: ScanPhase::PortScan,
        display_name: "Port Scan",
        description: "Service detection on the top ports of every live subdomain",
        optional: true,
    },
    PhaseDefinition {
        phase: ScanPhase::TechDetection,
        display_name: "Technology Detection",
        description: "Fingerprint the web stack of every live subdomain",
        optional: true,
    },
    PhaseDefinition {
        phase: ScanPhase::ContentDiscovery,
        display_name: "Content Discovery",
        description: "Crawl and brute-force paths on every live subdomain",
        optional: true,
    },
    PhaseDefinition {
        phase: ScanPhase::UrlCollection,
        display_name: "URL Collection",
        description: "Archived and crawled URLs for every live subdomain",
        optional: false,
    },
    PhaseDefinition {
        phase: ScanPhase::ParamDiscovery,
        display_name: "Parameter Discovery",
        description: "Deduplicate parameterized URLs and classify API endpoints",
        optional: false,
    },
    PhaseDefinition {
        phase: ScanPhase::Fuzzing,
        display_name: "Fuzzing",
        description: "Baseline-diff payload trials for every discovered parameter",
        optional: false,
    },
    PhaseDefinition {
        phase: ScanPhase::VulnerabilityScan,
        display_name: "Vulnerability Scan",
        description: "Template scan of every live subdomain",
        optional: true,
    },
    PhaseDefinition {
        phase: ScanPhase::JwtAnalysis,
        display_name: "JWT Analysis",
        description: "Check tokens seen in responses and URLs",
        optional: true,
    },
    PhaseDefinition {
        phase: ScanPhase::Reporting,
        display_name: "Reporting",
        description: "Hand the scan metadata to the result sink",
        optional: false,
    },
];

pub fn display_name(phase: ScanPhase) -> &'static str {
    PHASES
        .iter()
        .find(|p| p.phase == phase)
        .map(|p| p.display_name)
        .unwrap_or("Unknown")
}

/// Phases that will run with the given scan switches.
pub fn planned_phases(scan: &ScanConfig) -> Vec<ScanPhase> {
    PHASES
        .iter()
        .filter(|p| {
            !p.optional
                || match p.phase {
                    ScanPhase::PortScan => scan.enable_port_scan,
                    ScanPhase::TechDetection => scan.enable_tech_detection,
                    ScanPhase::ContentDiscovery => scan.enable_content_discovery,
                    ScanPhase::VulnerabilityScan => scan.enable_vulnerability_scan,
                    ScanPhase::JwtAnalysis => scan.enable_jwt_analysis,
                    _ => true,
                }
        })
        .map(|p| p.phase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_in_phase_order() {
        let phases: Vec<_> = PHASES.iter().map(|p| p.phase).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
    }

    #[test]
    fn test_planned_phases_skip_disabled_optionals() {
        let mut scan = ScanConfig::default();
        scan.enable_tech_detection = true;
        scan.enable_jwt_analysis = true;
        let planned = planned_phases(&scan);
        assert_eq!(planned.len(), PHASES.len() - 2);
        assert!(!planned.contains(&ScanPhase::PortScan));
        assert!(!planned.contains(&ScanPhase::ContentDiscovery));
        assert!(planned.contains(&ScanPhase::TechDetection));
        assert!(planned.contains(&ScanPhase::JwtAnalysis));

        scan.enable_vulnerability_scan = false;
        assert!(!planned_phases(&scan).contains(&ScanPhase::VulnerabilityScan));
    }
}
