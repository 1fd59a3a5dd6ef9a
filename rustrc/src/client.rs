//! Protocol-agnostic remote command client.
//!
//! A [`Config`] knows how to open a [`Session`] against one remote host; a
//! [`Client`] owns the resulting session and forwards commands to it.

use std::borrow::Cow;

/// A remote command and its arguments.
///
/// Arguments are shell-quoted when the command is serialized, so values with
/// spaces (e.g. a grep pattern) reach the remote shell as a single word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    cmd: String,
    args: Vec<String>,
}

impl Command {
    pub fn new<S: Into<String>>(cmd: S) -> Self {
        Command {
            cmd: cmd.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn get_cmd(&self) -> &str {
        &self.cmd
    }

    pub fn get_args(&self) -> &Vec<String> {
        &self.args
    }
}

impl From<&Command> for Vec<u8> {
    fn from(command: &Command) -> Self {
        let mut line = shell_escape::unix::escape(Cow::Borrowed(command.cmd.as_str())).into_owned();
        for arg in &command.args {
            line.push(' ');
            line.push_str(&shell_escape::unix::escape(Cow::Borrowed(arg.as_str())));
        }
        line.into_bytes()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes: Vec<u8> = self.into();
        write!(f, "{}", String::from_utf8_lossy(&bytes))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status_code: Option<u32>,
}

impl CommandOutput {
    /// Stdout followed by stderr, lossily decoded.
    pub fn combined(&self) -> String {
        let mut combined = String::from_utf8_lossy(&self.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&self.stderr));
        combined
    }
}

#[trait_variant::make(Send)]
pub trait Config: Sync {
    type SessionType: Session;

    async fn create_session(&self) -> crate::Result<Self::SessionType>;
}

#[trait_variant::make(Send)]
pub trait Session: Sync {
    async fn disconnect(&mut self) -> crate::Result<()>;

    async fn exec(&self, cmd: &Command) -> crate::Result<CommandOutput>;
}

pub struct Client<C: Config> {
    config: C,
    session: C::SessionType,
}

impl<C: Config> Client<C> {
    pub async fn connect(config: C) -> crate::Result<Self> {
        let session = config.create_session().await?;
        Ok(Client { config, session })
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub async fn exec(&self, cmd: &Command) -> crate::Result<CommandOutput> {
        self.session.exec(cmd).await
    }

    pub async fn disconnect(&mut self) -> crate::Result<()> {
        self.session.disconnect().await
    }
}
