//! Port to service-name classification.

use std::collections::BTreeMap;

pub const UNKNOWN_SERVICE: &str = "Unknown";

/// Commonly exploited TCP ports scanned when no port list is configured.
pub const DEFAULT_PORTS: [(u16, &str); 7] = [
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (80, "HTTP"),
    (443, "HTTPS"),
    (3306, "MySQL"),
    (3389, "RDP"),
];

/// Immutable port -> service label table, shared read-only by every scan task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    services: BTreeMap<u16, String>,
}

impl Default for PortSpec {
    fn default() -> Self {
        DEFAULT_PORTS
            .iter()
            .map(|&(port, name)| (port, name.to_string()))
            .collect()
    }
}

impl FromIterator<(u16, String)> for PortSpec {
    fn from_iter<I: IntoIterator<Item = (u16, String)>>(iter: I) -> Self {
        Self {
            services: iter.into_iter().collect(),
        }
    }
}

impl PortSpec {
    /// Label for `port`, or `"Unknown"` when the port is not in the table.
    pub fn classify(&self, port: u16) -> &str {
        self.services
            .get(&port)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SERVICE)
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.services.keys().copied()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.services.contains_key(&port)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Label the default table gives `port`, used for ports configured without one.
pub fn default_label(port: u16) -> &'static str {
    DEFAULT_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN_SERVICE)
}
