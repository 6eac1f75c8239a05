use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use rvoip_mgcp_core::MgcpMessage;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent};

/// Event queue depth when the caller does not pick one
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Largest datagram accepted or sent. RFC 3435 messages with SDP stay well below this.
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// MGCP over a single UDP socket
///
/// Cloning is cheap; every clone shares the socket and the event queue.
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<Shared>,
}

struct Shared {
    socket: UdpSocket,
    local_addr: SocketAddr,
    closed: AtomicBool,
    shutdown: Notify,
    events: mpsc::Sender<TransportEvent>,
}

/// What the receive loop should do after a datagram
enum Flow {
    Continue,
    Stop,
}

impl UdpTransport {
    /// Bind `addr` and start receiving
    ///
    /// Inbound messages arrive on the returned receiver. Binding port 0 picks a
    /// free port; read it back with [`Transport::local_addr`].
    pub async fn bind(
        addr: SocketAddr,
        event_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::BindFailed { addr, source })?;
        let local_addr = socket.local_addr()?;

        let (events, events_rx) = mpsc::channel(event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY));
        let inner = Arc::new(Shared {
            socket,
            local_addr,
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            events,
        });

        tokio::spawn(receive_loop(Arc::downgrade(&inner)));
        info!(%local_addr, "MGCP UDP transport listening");

        Ok((UdpTransport { inner }, events_rx))
    }
}

async fn receive_loop(shared: Weak<Shared>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let Some(inner) = shared.upgrade() else { return };
        if inner.closed.load(Ordering::Acquire) {
            break;
        }

        let received = tokio::select! {
            received = inner.socket.recv_from(&mut buf) => received,
            _ = inner.shutdown.notified() => break,
        };

        let flow = match received {
            Ok((len, source)) => {
                trace!(len, %source, "datagram");
                deliver(&inner, Bytes::copy_from_slice(&buf[..len]), source).await
            }
            Err(_) if inner.closed.load(Ordering::Acquire) => Flow::Stop,
            Err(e) => {
                // ICMP port unreachable surfaces here on some platforms
                error!("UDP receive failed: {}", e);
                report(&inner, format!("receive failed: {}", e)).await;
                Flow::Continue
            }
        };
        if let Flow::Stop = flow {
            break;
        }
    }

    if let Some(inner) = shared.upgrade() {
        let _ = inner.events.send(TransportEvent::Closed).await;
    }
    debug!("MGCP UDP receive loop stopped");
}

async fn deliver(inner: &Shared, datagram: Bytes, source: SocketAddr) -> Flow {
    let message = match rvoip_mgcp_core::parse_message(&datagram) {
        Ok(message) => message,
        Err(e) => {
            warn!(%source, "dropping malformed MGCP datagram: {}", e);
            report(inner, format!("malformed datagram from {}: {}", source, e)).await;
            return Flow::Continue;
        }
    };

    debug!(%source, tid = %message.transaction_id(), "MGCP message received");
    let event = TransportEvent::MessageReceived {
        message,
        source,
        destination: inner.local_addr,
    };
    match inner.events.send(event).await {
        Ok(()) => Flow::Continue,
        Err(_) => {
            debug!("event receiver dropped");
            Flow::Stop
        }
    }
}

async fn report(inner: &Shared, error: String) {
    let _ = inner.events.send(TransportEvent::Error { error }).await;
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr)
    }

    async fn send_message(&self, message: MgcpMessage, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let bytes = message.to_bytes();
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::MessageTooLarge {
                size: bytes.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }

        debug!(
            %destination,
            tid = %message.transaction_id(),
            len = bytes.len(),
            "sending MGCP {}",
            if message.is_request() { "request" } else { "response" }
        );

        self.inner
            .socket
            .send_to(&bytes, destination)
            .await
            .map_err(|source| Error::SendFailed { destination, source })?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.shutdown.notify_one();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UdpTransport({})", self.inner.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use rvoip_mgcp_core::{MgcpResponse, ReturnCode, TransactionId};

    #[tokio::test]
    async fn test_send_and_receive_between_transports() {
        let (a, _a_rx) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), None).await.unwrap();
        let (b, mut b_rx) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), None).await.unwrap();

        let response = MgcpResponse::new(ReturnCode::TransactionExecuted, TransactionId(42));
        a.send_message(response.clone().into(), b.local_addr().unwrap()).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), b_rx.recv()).await.unwrap().unwrap();
        match event {
            TransportEvent::MessageReceived { message, source, .. } => {
                assert_eq!(message, MgcpMessage::Response(response));
                assert_eq!(source, a.local_addr().unwrap());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_datagram_reports_error() {
        let (t, mut rx) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), None).await.unwrap();
        let raw = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(b"HELLO WORLD", t.local_addr().unwrap()).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, TransportEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_send() {
        let (t, mut rx) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), None).await.unwrap();
        t.close().await.unwrap();
        assert!(t.is_closed());

        let response = MgcpResponse::new(ReturnCode::TransactionExecuted, TransactionId(1));
        let result = t.send_message(response.into(), "127.0.0.1:9".parse().unwrap()).await;
        assert!(matches!(result, Err(Error::TransportClosed)));

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, TransportEvent::Closed));
    }
}
