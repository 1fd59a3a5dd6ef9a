use crate::client::{Command, CommandOutput, Config, Session};

use async_trait::async_trait;
use log::warn;
use russh::client;
use russh_keys::ssh_key::public::PublicKey;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{
    net::{lookup_host, ToSocketAddrs},
    time::Duration,
};

pub struct SSHSession {
    session: client::Handle<Handler>,
}

/// How the server's host key is checked during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept keys present in the user's `~/.ssh/known_hosts`. Unknown keys
    /// are rejected.
    #[default]
    KnownHosts,
    /// Same as `KnownHosts`, against an explicit file.
    KnownHostsFile(PathBuf),
    /// Accept any key. Leaves the session open to interception.
    AcceptAny,
}

/// Configuration for a password-authenticated SSH session
#[derive(Debug, Clone)]
pub struct SSHConfig {
    username: String,
    socket: SocketAddr,
    password: String,
    inactivity_timeout: Duration,
    host_key_policy: HostKeyPolicy,
}

impl SSHConfig {
    pub async fn password<U: Into<String>, S: ToSocketAddrs, P: Into<String>>(
        username: U,
        password: P,
        socket: S,
        inactivity_timeout: Duration,
    ) -> crate::Result<Self> {
        let socket_addr = lookup_host(&socket)
            .await?
            .next()
            .ok_or_else(|| crate::Error::ConnectionError("Error Parsing Socket".to_string()))?;

        Ok(SSHConfig {
            username: username.into(),
            socket: socket_addr,
            password: password.into(),
            inactivity_timeout,
            host_key_policy: HostKeyPolicy::default(),
        })
    }

    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn socket(&self) -> SocketAddr {
        self.socket
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Session for SSHSession {
    async fn disconnect(&mut self) -> crate::Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }

    /// Execute a command on the remote host, capturing stdout and stderr
    async fn exec(&self, cmd: &Command) -> crate::Result<CommandOutput> {
        let mut channel = self.session.channel_open_session().await?;

        let command: Vec<u8> = cmd.into();

        channel.exec(true, command).await?;

        let mut code = None;

        let mut stdout = vec![];
        let mut stderr = vec![];

        loop {
            let Some(msg) = channel.wait().await else {
                break;
            };
            match msg {
                russh::ChannelMsg::Data { ref data } => {
                    stdout.extend_from_slice(data);
                }
                russh::ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    stderr.extend_from_slice(data);
                }
                russh::ChannelMsg::ExitStatus { exit_status } => {
                    code = Some(exit_status);
                }
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            status_code: code,
        })
    }
}

impl Config for SSHConfig {
    type SessionType = SSHSession;

    async fn create_session(&self) -> crate::Result<Self::SessionType> {
        let handler = Handler {
            host: self.socket.ip().to_string(),
            port: self.socket.port(),
            policy: self.host_key_policy.clone(),
        };

        let mut session = get_handle(self.socket, self.inactivity_timeout, handler).await?;

        let auth_res = session
            .authenticate_password(&self.username, &self.password)
            .await?;

        if !auth_res {
            return Err(crate::Error::AuthenticationError(
                "Failed to authenticate with password".to_string(),
            ));
        }

        Ok(SSHSession { session })
    }
}

/// Get a handle to the SSH session
async fn get_handle<S: ToSocketAddrs>(
    socket: S,
    timeout: Duration,
    handler: Handler,
) -> crate::Result<russh::client::Handle<Handler>> {
    let config = client::Config {
        inactivity_timeout: Some(timeout),
        ..Default::default()
    };

    let config = Arc::new(config);

    let handle = client::connect(config, socket, handler).await?;

    Ok(handle)
}

struct Handler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl Handler {
    fn verify(&self, key: &PublicKey) -> crate::Result<bool> {
        let known = match &self.policy {
            HostKeyPolicy::AcceptAny => return Ok(true),
            HostKeyPolicy::KnownHosts => {
                russh_keys::check_known_hosts(&self.host, self.port, key)?
            }
            HostKeyPolicy::KnownHostsFile(path) => {
                russh_keys::check_known_hosts_path(&self.host, self.port, key, path)?
            }
        };
        Ok(known)
    }
}

#[async_trait]
impl client::Handler for Handler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        match self.verify(key) {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!("Host key for {}:{} is not in known_hosts", self.host, self.port);
                Ok(false)
            }
            Err(e) => {
                warn!("Host key check for {}:{} failed: {}", self.host, self.port, e);
                Ok(false)
            }
        }
    }
}
