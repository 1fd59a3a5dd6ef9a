use crate::credentials::Credentials;
use crate::types::IntrusionStatus;
use async_trait::async_trait;
use log::debug;
use rustrc::client::{Client, Command, CommandOutput};
use rustrc::cmd;
use rustrc::ssh::{HostKeyPolicy, SSHConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::time::timeout;

pub const AUTH_LOG: &str = "/var/log/auth.log";
pub const FAILED_LOGIN_MARKER: &str = "Failed password";

/// Looks for brute-force evidence in a host's authentication log.
///
/// Never fails: anything that goes wrong becomes `IntrusionStatus::CheckFailed`.
#[async_trait]
pub trait LogInspector: Send + Sync {
    async fn inspect(&self, addr: Ipv4Addr, credentials: &Credentials) -> IntrusionStatus;
}

pub fn log_check_command() -> Command {
    cmd!("grep", FAILED_LOGIN_MARKER, AUTH_LOG)
}

/// Interprets the grep run. Exit status 1 with no output is grep's
/// "no lines selected": the log was read and holds no failed logins, so it is
/// clean, not a log access error. 2 and above mean grep itself failed.
pub fn evaluate(output: &CommandOutput) -> IntrusionStatus {
    match output.status_code {
        Some(0) if output.combined().contains(FAILED_LOGIN_MARKER) => IntrusionStatus::Suspicious,
        Some(0) => IntrusionStatus::Clean,
        Some(1) if output.stdout.is_empty() => IntrusionStatus::Clean,
        Some(code) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                IntrusionStatus::failed(format!("log command exited with status {}", code))
            } else {
                IntrusionStatus::failed(format!(
                    "log command exited with status {}: {}",
                    code, stderr
                ))
            }
        }
        None => IntrusionStatus::failed("log command ended without an exit status"),
    }
}

/// Runs the grep over an SSH session with password authentication.
#[derive(Debug, Clone)]
pub struct SshLogInspector {
    port: u16,
    session_timeout: Duration,
    host_key_policy: HostKeyPolicy,
}

impl SshLogInspector {
    pub fn new(port: u16, session_timeout: Duration, host_key_policy: HostKeyPolicy) -> Self {
        Self {
            port,
            session_timeout,
            host_key_policy,
        }
    }

    async fn run(&self, addr: Ipv4Addr, credentials: &Credentials) -> rustrc::Result<CommandOutput> {
        let socket = SocketAddr::new(IpAddr::V4(addr), self.port);
        let config = SSHConfig::password(
            credentials.username.as_str(),
            credentials.password.as_str(),
            socket,
            self.session_timeout,
        )
        .await?
        .host_key_policy(self.host_key_policy.clone());

        let mut client = Client::connect(config).await?;
        let output = client.exec(&log_check_command()).await;

        let disconnected = client.disconnect().await;
        if let Err(e) = disconnected {
            debug!("Disconnect from {} failed: {}", client.config().socket(), e);
        }

        output
    }
}

#[async_trait]
impl LogInspector for SshLogInspector {
    async fn inspect(&self, addr: Ipv4Addr, credentials: &Credentials) -> IntrusionStatus {
        match timeout(self.session_timeout, self.run(addr, credentials)).await {
            Ok(Ok(output)) => evaluate(&output),
            Ok(Err(e)) => IntrusionStatus::failed(e),
            Err(_) => IntrusionStatus::failed(rustrc::Error::Timeout(self.session_timeout)),
        }
    }
}
