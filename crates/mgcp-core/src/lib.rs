//! # RVOIP MGCP Core
//!
//! Message model for the Media Gateway Control Protocol (RFC 3435).
//!
//! This crate knows how MGCP looks on the wire and nothing about what the
//! commands mean. It provides:
//!
//! - [`EndpointId`] with wildcard handling (`$` any, `*` all)
//! - [`Verb`], [`ReturnCode`], [`ParameterName`] / [`Parameters`]
//! - typed parameter values: [`ConnectionMode`], [`LocalConnectionOptions`],
//!   [`RequestedEvent`], [`SignalRequest`], [`ObservedEvent`]
//! - [`MgcpRequest`], [`MgcpResponse`], [`MgcpMessage`] with wire rendering
//! - [`parse_message`] to turn a datagram back into a message
//!
//! ```rust
//! use rvoip_mgcp_core::{parse_message, MgcpMessage, Verb};
//!
//! let datagram = b"CRCX 1204 bridge/$@mgw MGCP 1.0\r\nC: A3C4\r\nM: recvonly\r\n";
//! match parse_message(datagram).unwrap() {
//!     MgcpMessage::Request(request) => assert_eq!(request.verb, Verb::Crcx),
//!     MgcpMessage::Response(_) => unreachable!(),
//! }
//! ```

pub mod builder;
pub mod error;
pub mod message;
pub mod parser;
pub mod types;

pub use error::{Error, Result};
pub use message::{MgcpMessage, MgcpRequest, MgcpResponse, MGCP_VERSION};
pub use parser::parse_message;
pub use types::*;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::builder::{RequestBuilder, ResponseBuilder};
    pub use crate::{
        parse_message, ConnectionMode, EndpointId, Error, EventName, LocalConnectionOptions, MgcpMessage,
        MgcpRequest, MgcpResponse, ObservedEvent, ParameterName, Parameters, RequestedEvent, Result,
        ReturnCode, SignalRequest, TransactionId, Verb, Wildcard,
    };
}
