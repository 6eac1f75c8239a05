//! # RVOIP MGCP Transport
//!
//! Datagram transport for MGCP. Inbound datagrams are parsed with
//! [`rvoip_mgcp_core::parse_message`] and delivered as [`TransportEvent`]s on
//! an `mpsc` channel; outbound messages are rendered and sent with
//! [`Transport::send_message`].
//!
//! MGCP runs over UDP only (RFC 3435 Section 3.5). Reliability is the job of
//! the transaction layer above this crate.
//!
//! ```rust,no_run
//! use rvoip_mgcp_transport::{bind_udp, TransportEvent};
//!
//! # async fn run() -> rvoip_mgcp_transport::Result<()> {
//! let (transport, mut events) = bind_udp("127.0.0.1:2427".parse().unwrap()).await?;
//! while let Some(event) = events.recv().await {
//!     if let TransportEvent::MessageReceived { message, source, .. } = event {
//!         println!("{} from {}", message.transaction_id(), source);
//!     }
//! }
//! # drop(transport);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod transport;

use std::net::SocketAddr;

use tokio::sync::mpsc;

pub use error::{Error, Result};
pub use transport::udp::{UdpTransport, MAX_DATAGRAM_SIZE};
pub use transport::{Transport, TransportEvent};

/// Well-known port a media gateway listens on
pub const DEFAULT_GATEWAY_PORT: u16 = 2427;

/// Well-known port a call agent listens on
pub const DEFAULT_CALL_AGENT_PORT: u16 = 2727;

/// Bind a UDP transport with the default channel capacity
pub async fn bind_udp(addr: SocketAddr) -> Result<(UdpTransport, mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{bind_udp, Error, Result, Transport, TransportEvent, UdpTransport};
}
