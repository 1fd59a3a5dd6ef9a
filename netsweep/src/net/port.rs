use crate::services::PortSpec;
use crate::types::OpenPort;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Decides whether one TCP port accepts connections.
///
/// `Ok(false)` covers every answer the target can give (refused, filtered,
/// unreachable, timed out). `Err` is reserved for failures on our side.
#[async_trait]
pub trait PortScanner: Send + Sync {
    async fn scan(&self, addr: Ipv4Addr, port: u16, timeout: Duration) -> crate::Result<bool>;
}

/// Full-handshake connect scan, the stream is dropped as soon as it is up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnectScanner;

#[async_trait]
impl PortScanner for TcpConnectScanner {
    async fn scan(&self, addr: Ipv4Addr, port: u16, wait: Duration) -> crate::Result<bool> {
        if port == 0 {
            return Err(crate::Error::ArgumentError("port 0 cannot be scanned".into()));
        }

        let socket = SocketAddr::new(IpAddr::V4(addr), port);
        match timeout(wait, TcpStream::connect(socket)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Ok(true)
            }
            Ok(Err(e)) if is_local_failure(&e) => Err(e.into()),
            Ok(Err(_)) | Err(_) => Ok(false),
        }
    }
}

fn is_local_failure(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::AddrNotAvailable | ErrorKind::OutOfMemory | ErrorKind::InvalidInput
    ) || is_descriptor_exhaustion(err)
}

#[cfg(unix)]
fn is_descriptor_exhaustion(err: &std::io::Error) -> bool {
    // ENFILE, EMFILE
    matches!(err.raw_os_error(), Some(23) | Some(24))
}

#[cfg(not(unix))]
fn is_descriptor_exhaustion(_err: &std::io::Error) -> bool {
    false
}

/// Scans one port and classifies it when open.
pub async fn scan_port(
    scanner: &dyn PortScanner,
    spec: &PortSpec,
    addr: Ipv4Addr,
    port: u16,
    wait: Duration,
) -> crate::Result<Option<OpenPort>> {
    let open = scanner.scan(addr, port, wait).await?;
    Ok(open.then(|| OpenPort {
        port,
        service: spec.classify(port).to_string(),
    }))
}
