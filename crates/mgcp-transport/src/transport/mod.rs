//! Transport abstraction used by the media gateway
//!
//! A transport delivers inbound datagrams as parsed [`MgcpMessage`]s through a
//! [`TransportEvent`] channel and accepts outbound messages through
//! [`Transport::send_message`].

pub mod udp;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use rvoip_mgcp_core::MgcpMessage;

use crate::error::Result;

/// Events emitted by a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A message was received and parsed
    MessageReceived {
        /// The parsed message
        message: MgcpMessage,
        /// Address it came from
        source: SocketAddr,
        /// Local address it arrived on
        destination: SocketAddr,
    },
    /// A datagram could not be received or parsed
    Error {
        /// Description of the failure
        error: String,
    },
    /// The transport stopped receiving
    Closed,
}

/// A datagram transport for MGCP messages
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Local address the transport is bound to
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Send a message to `destination`
    async fn send_message(&self, message: MgcpMessage, destination: SocketAddr) -> Result<()>;

    /// Stop the transport
    async fn close(&self) -> Result<()>;

    /// Whether [`Transport::close`] has been called
    fn is_closed(&self) -> bool;
}
