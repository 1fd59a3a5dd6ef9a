use async_trait::async_trait;
use std::net::Ipv4Addr;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies the remote-shell login for a host.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, addr: Ipv4Addr) -> crate::Result<Credentials>;
}

/// The same credentials for every host.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self, _addr: Ipv4Addr) -> crate::Result<Credentials> {
        Ok(self.0.clone())
    }
}
