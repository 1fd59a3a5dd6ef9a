use crate::credentials::Credentials;
use crate::enumerator::Subnet;
use crate::net::ping::ProberKind;
use crate::orchestrator::{LogCheckPolicy, ScanParams};
use crate::report::OutputFormat;
use crate::services::{default_label, PortSpec};
use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use rustrc::ssh::HostKeyPolicy;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub subnet: Subnet,
    pub params: ScanParams,
    pub credentials: Credentials,
    pub session_timeout: Duration,
    pub host_key_policy: HostKeyPolicy,
    pub prober: ProberKind,
    pub format: OutputFormat,
}

pub fn command() -> Command {
    Command::new("netsweep")
        .version(crate_version!())
        .about("Sweeps a /24 for live hosts, open ports and failed SSH logins")
        .arg(
            Arg::new("subnet")
                .help("Subnet to sweep, as a.b.c or a.b.c.0/24")
                .required(true),
        )
        .arg(
            Arg::new("ports")
                .long("ports")
                .short('p')
                .help("Comma separated ports, optionally labelled: 22=SSH,80,8080=HTTP-alt"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .help("Per-probe timeout in milliseconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("1000"),
        )
        .arg(
            Arg::new("session-timeout")
                .long("session-timeout")
                .help("Timeout in seconds for a whole SSH log check")
                .value_parser(clap::value_parser!(u64))
                .default_value("10"),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .short('c')
                .help("Maximum network operations in flight")
                .value_parser(clap::value_parser!(usize))
                .default_value("64"),
        )
        .arg(
            Arg::new("username")
                .long("username")
                .short('u')
                .env("NETSWEEP_USERNAME")
                .required(true),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .env("NETSWEEP_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("ssh-port")
                .long("ssh-port")
                .value_parser(clap::value_parser!(u16).range(1..))
                .default_value("22"),
        )
        .arg(
            Arg::new("known-hosts")
                .long("known-hosts")
                .help("known_hosts file used to verify SSH host keys")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("insecure-accept-host-key")
                .long("insecure-accept-host-key")
                .help("Skip SSH host key verification")
                .action(ArgAction::SetTrue)
                .conflicts_with("known-hosts"),
        )
        .arg(
            Arg::new("log-check")
                .long("log-check")
                .value_parser(["always", "when-ssh-open"])
                .default_value("always"),
        )
        .arg(
            Arg::new("prober")
                .long("prober")
                .value_parser(["auto", "icmp", "system"])
                .default_value("auto"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .short('f')
                .value_parser(["text", "json", "inventory"])
                .default_value("text"),
        )
}

/// Parses `22=SSH,80,8080=HTTP-alt`. Unlabelled ports take their default label.
pub fn parse_ports(value: &str) -> crate::Result<PortSpec> {
    let mut entries = Vec::new();
    for item in value.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (port, label) = match item.split_once('=') {
            Some((port, label)) => (port.trim(), Some(label.trim())),
            None => (item, None),
        };
        let port: u16 = port.parse()?;
        if port == 0 {
            return Err(crate::Error::ArgumentError("port 0 is not scannable".into()));
        }
        let label = match label {
            Some("") => {
                return Err(crate::Error::ArgumentError(format!(
                    "empty service label for port {}",
                    port
                )))
            }
            Some(label) => label.to_string(),
            None => default_label(port).to_string(),
        };
        entries.push((port, label));
    }

    if entries.is_empty() {
        return Err(crate::Error::ArgumentError("no ports to scan".into()));
    }
    Ok(entries.into_iter().collect())
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> crate::Result<&'a String> {
    matches
        .get_one::<String>(id)
        .ok_or_else(|| crate::Error::ArgumentError(format!("missing --{}", id)))
}

fn number<T: Copy + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> crate::Result<T> {
    matches
        .get_one::<T>(id)
        .copied()
        .ok_or_else(|| crate::Error::ArgumentError(format!("missing --{}", id)))
}

impl TryFrom<&ArgMatches> for Config {
    type Error = crate::Error;

    fn try_from(matches: &ArgMatches) -> crate::Result<Self> {
        let subnet = Subnet::try_from(required(matches, "subnet")?.as_str())?;

        let ports = match matches.get_one::<String>("ports") {
            Some(value) => parse_ports(value)?,
            None => PortSpec::default(),
        };

        let timeout_ms: u64 = number(matches, "timeout-ms")?;
        if timeout_ms == 0 {
            return Err(crate::Error::ArgumentError("--timeout-ms must be positive".into()));
        }
        let session_secs: u64 = number(matches, "session-timeout")?;
        if session_secs == 0 {
            return Err(crate::Error::ArgumentError(
                "--session-timeout must be positive".into(),
            ));
        }
        let concurrency: usize = number(matches, "concurrency")?;
        if concurrency == 0 {
            return Err(crate::Error::ArgumentError("--concurrency must be at least 1".into()));
        }

        let username = required(matches, "username")?;
        let password = required(matches, "password")?;
        if username.is_empty() || password.is_empty() {
            return Err(crate::Error::ArgumentError(
                "username and password must not be empty".into(),
            ));
        }

        let ssh_port: u16 = number(matches, "ssh-port")?;
        let log_check: LogCheckPolicy = required(matches, "log-check")?.parse()?;
        if log_check == LogCheckPolicy::WhenSshOpen && !ports.contains(ssh_port) {
            return Err(crate::Error::ArgumentError(format!(
                "--log-check when-ssh-open needs port {} in the scanned ports",
                ssh_port
            )));
        }

        let host_key_policy = if matches.get_flag("insecure-accept-host-key") {
            HostKeyPolicy::AcceptAny
        } else {
            match matches.get_one::<PathBuf>("known-hosts") {
                Some(path) => HostKeyPolicy::KnownHostsFile(path.clone()),
                None => HostKeyPolicy::KnownHosts,
            }
        };

        Ok(Self {
            subnet,
            params: ScanParams {
                ports: ports.into(),
                probe_timeout: Duration::from_millis(timeout_ms),
                concurrency,
                ssh_port,
                log_check,
            },
            credentials: Credentials::new(username.as_str(), password.as_str()),
            session_timeout: Duration::from_secs(session_secs),
            host_key_policy,
            prober: required(matches, "prober")?.parse()?,
            format: required(matches, "format")?.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::orchestrator::DEFAULT_CONCURRENCY;

    fn config(args: &[&str]) -> crate::Result<Config> {
        let matches = command()
            .try_get_matches_from(std::iter::once("netsweep").chain(args.iter().copied()))
            .map_err(|e| crate::Error::ArgumentError(e.to_string()))?;
        Config::try_from(&matches)
    }

    #[test]
    fn defaults_match_the_classic_sweep() {
        let config = config(&["192.168.1", "--username", "root", "--password", "pw"]).unwrap();

        assert_eq!(config.subnet, Subnet::new(192, 168, 1));
        assert_eq!(*config.params.ports, PortSpec::default());
        assert_eq!(config.params.probe_timeout, Duration::from_secs(1));
        assert_eq!(config.params.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.params.log_check, LogCheckPolicy::Always);
        assert_eq!(config.host_key_policy, HostKeyPolicy::KnownHosts);
        assert_eq!(config.prober, ProberKind::Auto);
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.credentials, Credentials::new("root", "pw"));
    }

    #[test]
    fn explicit_options_are_applied() {
        let config = config(&[
            "10.0.0.0/24",
            "-u",
            "admin",
            "--password",
            "pw",
            "--ports",
            "22=SSH,80",
            "--timeout-ms",
            "250",
            "--concurrency",
            "8",
            "--insecure-accept-host-key",
            "--log-check",
            "when-ssh-open",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(config.params.ports.classify(80), "HTTP");
        assert_eq!(config.params.ports.len(), 2);
        assert_eq!(config.params.probe_timeout, Duration::from_millis(250));
        assert_eq!(config.params.concurrency, 8);
        assert_eq!(config.host_key_policy, HostKeyPolicy::AcceptAny);
        assert_eq!(config.params.log_check, LogCheckPolicy::WhenSshOpen);
        assert_eq!(config.format, OutputFormat::Json);
    }

    #[test]
    fn missing_credentials_are_fatal() {
        assert!(config(&["10.0.0", "--username", "root"]).is_err());
    }

    #[test]
    fn malformed_subnet_is_fatal() {
        assert!(config(&["10.0", "-u", "root", "--password", "pw"]).is_err());
        assert!(config(&["10.0.0.0/16", "-u", "root", "--password", "pw"]).is_err());
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(config(&["10.0.0", "-u", "r", "--password", "p", "--timeout-ms", "0"]).is_err());
        assert!(config(&["10.0.0", "-u", "r", "--password", "p", "--concurrency", "0"]).is_err());
    }

    #[test]
    fn gated_log_check_needs_ssh_port_scanned() {
        let result = config(&[
            "10.0.0", "-u", "r", "--password", "p", "--ports", "80", "--log-check", "when-ssh-open",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn port_list_parsing() {
        let spec = parse_ports("22=SSH, 8080=HTTP-alt,3306").unwrap();
        assert_eq!(spec.classify(8080), "HTTP-alt");
        assert_eq!(spec.classify(3306), "MySQL");
        assert!(parse_ports("").is_err());
        assert!(parse_ports("0").is_err());
        assert!(parse_ports("70000").is_err());
        assert!(parse_ports("22=").is_err());
    }
}
