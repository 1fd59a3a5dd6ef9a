//! Liveness probing.
//!
//! Two [`Prober`] implementations exist: a native ICMP echo client and a
//! fallback that shells out to the system `ping`. [`select_prober`] picks one
//! at runtime depending on whether an ICMP socket can be opened.

use crate::types::ProbeOutcome;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence, SurgeError};
use tokio::process::Command;
use tokio::time::timeout;

const PAYLOAD: [u8; 56] = [0; 56];

#[async_trait]
pub trait Prober: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self, addr: Ipv4Addr, timeout: Duration) -> ProbeOutcome;
}

/// Single ICMP echo through a surge-ping client.
pub struct IcmpProber {
    client: Client,
}

impl IcmpProber {
    /// Fails when the process may not open an ICMP socket.
    pub fn new() -> std::io::Result<Self> {
        let client = Client::new(&Config::default())?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for IcmpProber {
    fn name(&self) -> &'static str {
        "icmp"
    }

    async fn probe(&self, addr: Ipv4Addr, wait: Duration) -> ProbeOutcome {
        let mut pinger = self
            .client
            .pinger(IpAddr::V4(addr), PingIdentifier(rand::random()))
            .await;
        pinger.timeout(wait);

        match timeout(wait, pinger.ping(PingSequence(0), &PAYLOAD)).await {
            Ok(Ok((IcmpPacket::V4(packet), rtt))) => {
                debug!("{} replied (ttl {:?}, {:?})", addr, packet.get_ttl(), rtt);
                ProbeOutcome::Alive
            }
            Ok(Ok((IcmpPacket::V6(_), _))) => ProbeOutcome::Alive,
            Ok(Err(e)) => surge_outcome(e),
            Err(_) => ProbeOutcome::Timeout,
        }
    }
}

fn surge_outcome(err: SurgeError) -> ProbeOutcome {
    match err {
        SurgeError::Timeout { .. } => ProbeOutcome::Timeout,
        SurgeError::IOError(e) => io_outcome(&e),
        other => ProbeOutcome::Failed(other.to_string()),
    }
}

fn io_outcome(err: &std::io::Error) -> ProbeOutcome {
    match err.kind() {
        ErrorKind::PermissionDenied => ProbeOutcome::PermissionDenied,
        ErrorKind::TimedOut => ProbeOutcome::Timeout,
        _ => ProbeOutcome::Unreachable,
    }
}

/// Runs the operating system's `ping` with one echo request.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPingProber;

impl SystemPingProber {
    fn command(addr: Ipv4Addr, wait: Duration) -> Command {
        let mut cmd = Command::new("ping");
        if cfg!(target_os = "windows") {
            cmd.arg("-n")
                .arg("1")
                .arg("-w")
                .arg(wait.as_millis().max(1).to_string());
        } else {
            // -W takes whole seconds
            let secs = wait.as_secs_f64().ceil().max(1.0) as u64;
            cmd.arg("-c").arg("1").arg("-W").arg(secs.to_string());
        }
        cmd.arg(addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// Maps `ping`'s exit status: 0 is a reply, 1 is no reply, anything else is
/// an error in ping itself (bad arguments, unknown host, killed).
pub(crate) fn exit_outcome(code: Option<i32>) -> ProbeOutcome {
    match code {
        Some(0) => ProbeOutcome::Alive,
        Some(1) => ProbeOutcome::Unreachable,
        Some(code) => ProbeOutcome::Failed(format!("ping exited with status {}", code)),
        None => ProbeOutcome::Failed("ping terminated by signal".to_string()),
    }
}

#[async_trait]
impl Prober for SystemPingProber {
    fn name(&self) -> &'static str {
        "system ping"
    }

    async fn probe(&self, addr: Ipv4Addr, wait: Duration) -> ProbeOutcome {
        let mut cmd = Self::command(addr, wait);
        // ping rounds -W up to whole seconds, give it that plus slack
        let deadline = Duration::from_secs(wait.as_secs() + 2);

        match timeout(deadline, cmd.status()).await {
            Ok(Ok(status)) => exit_outcome(status.code()),
            Ok(Err(e)) if e.kind() == ErrorKind::PermissionDenied => ProbeOutcome::PermissionDenied,
            Ok(Err(e)) => ProbeOutcome::Failed(format!("failed to run ping: {}", e)),
            Err(_) => ProbeOutcome::Timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProberKind {
    #[default]
    Auto,
    Icmp,
    System,
}

impl FromStr for ProberKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "auto" => Ok(ProberKind::Auto),
            "icmp" => Ok(ProberKind::Icmp),
            "system" => Ok(ProberKind::System),
            other => Err(crate::Error::ArgumentError(format!("unknown prober: {}", other))),
        }
    }
}

/// Builds the liveness prober. `Auto` prefers ICMP sockets and falls back to
/// the system `ping` when they cannot be opened; `Icmp` fails instead.
pub fn select_prober(kind: ProberKind) -> crate::Result<Arc<dyn Prober>> {
    choose_prober(kind, IcmpProber::new)
}

fn choose_prober<F>(kind: ProberKind, open_icmp: F) -> crate::Result<Arc<dyn Prober>>
where
    F: FnOnce() -> std::io::Result<IcmpProber>,
{
    let prober: Arc<dyn Prober> = match kind {
        ProberKind::Icmp => Arc::new(open_icmp()?),
        ProberKind::System => Arc::new(SystemPingProber),
        ProberKind::Auto => match open_icmp() {
            Ok(prober) => Arc::new(prober),
            Err(e) => {
                warn!("ICMP socket unavailable ({}), falling back to system ping", e);
                Arc::new(SystemPingProber)
            }
        },
    };
    info!("Using {} liveness prober", prober.name());
    Ok(prober)
}
