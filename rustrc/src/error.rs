use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
    #[error("Host key error: {0}")]
    HostKeyError(String),
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Socket Error: {0}")]
    SocketError(#[from] std::io::Error),
}

#[cfg(feature = "ssh")]
impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        match err {
            russh::Error::UnknownKey => {
                Error::HostKeyError("server host key is not trusted".to_string())
            }
            russh::Error::ConnectionTimeout | russh::Error::InactivityTimeout => {
                Error::ConnectionError(err.to_string())
            }
            russh::Error::IO(e) => Error::SocketError(e),
            _ => Error::ConnectionError(err.to_string()),
        }
    }
}

#[cfg(feature = "ssh")]
impl From<russh_keys::Error> for Error {
    fn from(err: russh_keys::Error) -> Self {
        match err {
            russh_keys::Error::KeyChanged { line } => Error::HostKeyError(format!(
                "host key changed, known_hosts line {}",
                line
            )),
            _ => Error::ConnectionError(err.to_string()),
        }
    }
}

/// A custom `Result` type for our client operations.
pub type Result<T> = std::result::Result<T, Error>;
