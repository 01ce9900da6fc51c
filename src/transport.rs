use crate::error::{AmpError, Result};
use crate::protocol::{frame, SEQUENCE_MAX, SEQUENCE_MIN};
use futures_util::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

/// How long to wait for a reply datagram
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

const MAX_DATAGRAM: usize = 1024;

/// One-shot command delivery to an amplifier.
///
/// `Ok(None)` means the command went out but nothing came back in time.
/// `Err` is reserved for failures to deliver at all.
pub trait Transport: Send + Sync {
    fn send_command<'a>(
        &'a self,
        command: &'a str,
        host: &'a str,
        port: u16,
    ) -> BoxFuture<'a, Result<Option<String>>>;

    /// Deliver a command and return as soon as it is sent
    fn send_only<'a>(&'a self, command: &'a str, host: &'a str, port: u16) -> BoxFuture<'a, Result<()>>;
}

/// Text-over-UDP transport
pub struct UdpTransport {
    reply_timeout: Duration,
    sequence: AtomicU8,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::with_timeout(REPLY_TIMEOUT)
    }

    pub fn with_timeout(reply_timeout: Duration) -> Self {
        Self {
            reply_timeout,
            sequence: AtomicU8::new(SEQUENCE_MIN),
        }
    }

    fn next_sequence(&self) -> u8 {
        let result = self.sequence.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |seq| {
            Some(if seq >= SEQUENCE_MAX { SEQUENCE_MIN } else { seq + 1 })
        });
        match result {
            Ok(seq) | Err(seq) => seq,
        }
    }

    async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
        let unresolvable = || AmpError::UnresolvableHost {
            host: host.to_string(),
            port,
        };
        lookup_host((host, port))
            .await
            .map_err(|e| {
                tracing::debug!("Lookup of {}:{} failed: {}", host, port, e);
                unresolvable()
            })?
            .next()
            .ok_or_else(unresolvable)
    }

    async fn deliver(&self, command: &str, host: &str, port: u16) -> Result<(UdpSocket, SocketAddr)> {
        let addr = Self::resolve(host, port).await?;
        let bind_addr: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        let datagram = frame(self.next_sequence(), command);
        tracing::debug!("Sending to {}: {:?}", addr, datagram);
        socket.send_to(datagram.as_bytes(), addr).await?;
        Ok((socket, addr))
    }

    async fn exchange(&self, command: &str, host: &str, port: u16) -> Result<Option<String>> {
        let (socket, addr) = self.deliver(command, host, port).await?;

        let mut buf = [0u8; MAX_DATAGRAM];
        match timeout(self.reply_timeout, socket.recv_from(&mut buf)).await {
            Ok(Ok((0, _))) => Ok(None),
            Ok(Ok((len, from))) => {
                let text = String::from_utf8_lossy(&buf[..len]).trim().to_string();
                tracing::debug!("Received from {}: {:?}", from, text);
                Ok(Some(text))
            }
            Ok(Err(e)) => {
                // ICMP port-unreachable shows up here on some platforms
                tracing::debug!("No reply from {}: {}", addr, e);
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UdpTransport {
    fn send_command<'a>(
        &'a self,
        command: &'a str,
        host: &'a str,
        port: u16,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(self.exchange(command, host, port))
    }

    fn send_only<'a>(&'a self, command: &'a str, host: &'a str, port: u16) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.deliver(command, host, port).await?;
            Ok(())
        })
    }
}
