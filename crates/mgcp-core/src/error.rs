//! Error types for MGCP message handling
//!
//! Every failure raised while turning bytes into [`MgcpMessage`](crate::MgcpMessage)s
//! (or while parsing individual parameter values) is reported through [`Error`].

use thiserror::Error;

/// Result type alias for MGCP wire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the MGCP wire layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Generic parse failure with a description of what was wrong
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The datagram was not valid UTF-8
    #[error("Message is not valid UTF-8")]
    InvalidUtf8,

    /// Command verb is not part of RFC 3435
    #[error("Unknown command verb: {0}")]
    UnknownVerb(String),

    /// Transaction identifier was missing or out of range
    #[error("Invalid transaction id: {0}")]
    InvalidTransactionId(String),

    /// Protocol version is not MGCP
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    /// Endpoint identifier could not be parsed
    #[error("Invalid endpoint identifier: {0}")]
    InvalidEndpointId(String),

    /// Connection mode is not one of the RFC 3435 modes
    #[error("Invalid connection mode: {0}")]
    InvalidMode(String),

    /// A parameter value was malformed
    #[error("Invalid value for parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter code as it appeared on the wire
        name: String,
        /// What was wrong with the value
        reason: String,
    },
}

impl Error {
    /// Create a new invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new generic parse error
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::ParseError(reason.into())
    }
}
