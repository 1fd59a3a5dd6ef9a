use serde::{Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;

/// Result of a liveness probe.
///
/// Every variant other than `Alive` means the host is skipped, but the cause
/// is kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "kebab-case")]
pub enum ProbeOutcome {
    Alive,
    Unreachable,
    Timeout,
    PermissionDenied,
    Cancelled,
    Failed(String),
}

impl ProbeOutcome {
    pub fn is_alive(&self) -> bool {
        matches!(self, ProbeOutcome::Alive)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Alive => write!(f, "alive"),
            ProbeOutcome::Unreachable => write!(f, "unreachable"),
            ProbeOutcome::Timeout => write!(f, "timeout"),
            ProbeOutcome::PermissionDenied => write!(f, "permission denied"),
            ProbeOutcome::Cancelled => write!(f, "cancelled"),
            ProbeOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcome of the authentication log check on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntrusionStatus {
    Clean,
    Suspicious,
    CheckFailed(String),
}

impl IntrusionStatus {
    pub fn failed<R: fmt::Display>(reason: R) -> Self {
        IntrusionStatus::CheckFailed(reason.to_string())
    }
}

impl fmt::Display for IntrusionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntrusionStatus::Clean => write!(f, "checked-clean"),
            IntrusionStatus::Suspicious => write!(f, "checked-suspicious"),
            IntrusionStatus::CheckFailed(reason) => write!(f, "check-failed:{}", reason),
        }
    }
}

impl Serialize for IntrusionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct OpenPort {
    pub port: u16,
    pub service: String,
}

/// Everything the sweep learned about one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostResult {
    pub address: Ipv4Addr,
    pub alive: bool,
    pub probe: ProbeOutcome,
    pub open_ports: Vec<OpenPort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intrusion: Option<IntrusionStatus>,
}

impl HostResult {
    /// Terminal record for an address whose liveness probe failed.
    pub fn dead(address: Ipv4Addr, probe: ProbeOutcome) -> Self {
        Self {
            address,
            alive: false,
            probe,
            open_ports: Vec::new(),
            intrusion: None,
        }
    }

    pub fn alive(
        address: Ipv4Addr,
        mut open_ports: Vec<OpenPort>,
        intrusion: Option<IntrusionStatus>,
    ) -> Self {
        open_ports.sort();
        Self {
            address,
            alive: true,
            probe: ProbeOutcome::Alive,
            open_ports,
            intrusion,
        }
    }
}

/// One human-readable finding, emitted while the sweep runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    HostUp(Ipv4Addr),
    PortOpen(Ipv4Addr, OpenPort),
    IntrusionChecked(Ipv4Addr, IntrusionStatus),
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanEvent::HostUp(ip) => write!(f, "Host {} is up", ip),
            ScanEvent::PortOpen(ip, open) => write!(
                f,
                "Host {} has port {} open ({})",
                ip, open.port, open.service
            ),
            ScanEvent::IntrusionChecked(ip, IntrusionStatus::Suspicious) => write!(
                f,
                "Potential intrusion detected on {}: Failed login attempts found.",
                ip
            ),
            ScanEvent::IntrusionChecked(ip, IntrusionStatus::Clean) => {
                write!(f, "No intrusion signs found on {}.", ip)
            }
            ScanEvent::IntrusionChecked(ip, IntrusionStatus::CheckFailed(reason)) => {
                write!(f, "Intrusion check failed on {}: {}", ip, reason)
            }
        }
    }
}
