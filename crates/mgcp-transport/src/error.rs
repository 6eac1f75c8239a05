//! Error types for the MGCP transport layer

use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by transports
#[derive(Error, Debug)]
pub enum Error {
    /// Socket could not be bound
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        /// Requested address
        addr: SocketAddr,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Sending a datagram failed
    #[error("Failed to send to {destination}: {source}")]
    SendFailed {
        /// Destination of the datagram
        destination: SocketAddr,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Encoded message does not fit a UDP datagram
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Encoded size
        size: usize,
        /// Largest datagram accepted
        max: usize,
    },

    /// The transport has been closed
    #[error("Transport is closed")]
    TransportClosed,

    /// Any other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
