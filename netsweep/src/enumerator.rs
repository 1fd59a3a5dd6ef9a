use crate::Result;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Host octets swept in every subnet; network (0) and broadcast (255) are excluded.
pub const HOST_RANGE: RangeInclusive<u8> = 1..=254;

/// A /24 block identified by its first three octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    prefix: [u8; 3],
}

impl Subnet {
    pub fn new(a: u8, b: u8, c: u8) -> Self {
        Self { prefix: [a, b, c] }
    }

    pub fn host(&self, octet: u8) -> Ipv4Addr {
        let [a, b, c] = self.prefix;
        Ipv4Addr::new(a, b, c, octet)
    }

    pub fn iter_hosts(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        HOST_RANGE.map(|octet| self.host(octet))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let [a, b, c, d] = ip.octets();
        [a, b, c] == self.prefix && HOST_RANGE.contains(&d)
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c] = self.prefix;
        write!(f, "{}.{}.{}.0/24", a, b, c)
    }
}

/// Accepts `a.b.c` or `a.b.c.0/24`. Octets follow `Ipv4Addr` rules, so signs
/// and leading zeros are rejected.
impl TryFrom<&str> for Subnet {
    type Error = crate::Error;

    fn try_from(value: &str) -> Result<Self> {
        let value = value.trim();
        let ip: Ipv4Addr = match value.split_once('/') {
            Some((ip, mask)) => {
                if mask != "24" {
                    return Err(Self::Error::ArgumentError(format!(
                        "only /24 subnets can be swept, got /{}",
                        mask
                    )));
                }
                let ip: Ipv4Addr = ip.parse()?;
                if ip.octets()[3] != 0 {
                    return Err(Self::Error::ArgumentError(format!(
                        "host bits set in subnet: {}",
                        value
                    )));
                }
                ip
            }
            None => format!("{}.0", value).parse::<Ipv4Addr>().map_err(|_| {
                Self::Error::ArgumentError(format!(
                    "subnet prefix must be three octets a.b.c: {}",
                    value
                ))
            })?,
        };

        let [a, b, c, _] = ip.octets();
        Ok(Self::new(a, b, c))
    }
}

impl FromStr for Subnet {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        Subnet::try_from(s)
    }
}
