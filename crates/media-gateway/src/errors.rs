//! Error types for the media gateway
//!
//! Every failure the control plane can hit is a [`GatewayError`]. Errors that
//! a call agent can trigger end up in a response: [`GatewayError::return_code`]
//! gives the RFC 3435 code each variant is reported with.
//!
//! | error | code |
//! |-------|------|
//! | `UnrecognizedNamespace`, `UnrecognizedEndpoint` | 500 |
//! | `EndpointNotReady` | 501 |
//! | `TooManyConnections` | 502 |
//! | `WildcardTooComplicated` | 503 |
//! | `MediaResourceUnavailable` | 403 |
//! | `NoEndpointAvailable` | 410 |
//! | `IllegalState`, `ConnectionClosed`, `Media`, `Transport` | 400 |
//! | `ConnectionNotFound` | 515 |
//! | `CallIdMismatch` | 516 |
//! | `InvalidMode` | 517 |
//! | `UnsupportedPackage` | 518 |
//! | `UnsupportedEvent`, `UnsupportedSignal` | 522 |
//! | `UnsupportedSdp` | 505 |
//! | `MissingRemoteDescription` | 527 |
//! | `MissingParameter`, `Protocol` | 510 |
//! | `InvalidParameter` | 538 |
//! | `UnsupportedCommand` | 504 |
//! | `Aborted` | 407 |
//! | `TransactionConflict`, `DuplicateNamespace`, `Config`, `Internal` | 500 |

use rvoip_mgcp_core::{ReturnCode, TransactionId, Verb};
use thiserror::Error;

/// Result type for media gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors raised by the media gateway control plane
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No provider is installed for the namespace
    #[error("Unrecognized namespace: {namespace}")]
    UnrecognizedNamespace { namespace: String },

    /// No endpoint matches the identifier
    #[error("Unrecognized endpoint: {endpoint}")]
    UnrecognizedEndpoint { endpoint: String },

    /// A provider is already installed for the namespace
    #[error("Namespace already installed: {namespace}")]
    DuplicateNamespace { namespace: String },

    /// `$` resolution found no free endpoint and the provider may not grow
    #[error("No endpoint available in namespace {namespace}")]
    NoEndpointAvailable { namespace: String },

    /// Endpoint has been closed
    #[error("Endpoint not ready: {endpoint}")]
    EndpointNotReady { endpoint: String },

    /// Endpoint connection capacity is exhausted
    #[error("Endpoint {endpoint} already has {max} connections")]
    TooManyConnections { endpoint: String, max: usize },

    /// `*` was used where a single endpoint is required
    #[error("Wildcard not allowed here: {endpoint}")]
    WildcardTooComplicated { endpoint: String },

    /// No connection with this id on the endpoint
    #[error("Connection not found: {connection_id}")]
    ConnectionNotFound { connection_id: String },

    /// `C:` does not match the call the connection belongs to
    #[error("Call id mismatch on connection {connection_id}: expected {expected}, got {actual}")]
    CallIdMismatch {
        connection_id: String,
        expected: String,
        actual: String,
    },

    /// Operation not valid in the current state
    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    /// Connection was closed while the operation was outstanding
    #[error("Connection {connection_id} is closed")]
    ConnectionClosed { connection_id: String },

    /// A pooled or external media resource could not be allocated
    #[error("Media resource unavailable: {resource}")]
    MediaResourceUnavailable { resource: String },

    /// Connection mode not supported
    #[error("Invalid connection mode: {mode}")]
    InvalidMode { mode: String },

    /// Event or signal package unknown
    #[error("Unsupported package: {package}")]
    UnsupportedPackage { package: String },

    /// Event unknown within its package, or not detectable where requested
    #[error("Unsupported event: {event}")]
    UnsupportedEvent { event: String },

    /// Signal unknown within its package
    #[error("Unsupported signal: {signal}")]
    UnsupportedSignal { signal: String },

    /// Remote session description cannot be used
    #[error("Unsupported session description: {reason}")]
    UnsupportedSdp { reason: String },

    /// Operation needs a remote session description
    #[error("Missing remote session description")]
    MissingRemoteDescription,

    /// A required parameter is absent
    #[error("Missing parameter {name}")]
    MissingParameter { name: String },

    /// A parameter value is malformed
    #[error("Invalid value for parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Request could not be interpreted
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// No command is registered for the verb
    #[error("Unsupported command: {verb}")]
    UnsupportedCommand { verb: Verb },

    /// A transaction was completed twice
    #[error("Transaction {transaction_id} completed twice")]
    TransactionConflict { transaction_id: TransactionId },

    /// Command execution was aborted
    #[error("Transaction aborted: {reason}")]
    Aborted { reason: String },

    /// External media capability failure
    #[error("Media error: {message}")]
    Media { message: String },

    /// Transport failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Configuration is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create an illegal state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Create a missing parameter error
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a media resource error
    pub fn resource_unavailable(resource: impl Into<String>) -> Self {
        Self::MediaResourceUnavailable {
            resource: resource.into(),
        }
    }

    /// Create an unsupported SDP error
    pub fn unsupported_sdp(reason: impl Into<String>) -> Self {
        Self::UnsupportedSdp {
            reason: reason.into(),
        }
    }

    /// Create a media error
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Return code used when this error terminates a transaction
    pub fn return_code(&self) -> ReturnCode {
        match self {
            GatewayError::UnrecognizedNamespace { .. } | GatewayError::UnrecognizedEndpoint { .. } => {
                ReturnCode::EndpointUnknown
            }
            GatewayError::EndpointNotReady { .. } => ReturnCode::EndpointNotReady,
            GatewayError::TooManyConnections { .. } => ReturnCode::EndpointInsufficientResources,
            GatewayError::WildcardTooComplicated { .. } => ReturnCode::WildcardTooComplicated,
            GatewayError::MediaResourceUnavailable { .. } => ReturnCode::InsufficientResourcesNow,
            GatewayError::NoEndpointAvailable { .. } => ReturnCode::NoEndpointAvailable,
            GatewayError::IllegalState { .. }
            | GatewayError::ConnectionClosed { .. }
            | GatewayError::Media { .. }
            | GatewayError::Transport { .. } => ReturnCode::TransientError,
            GatewayError::ConnectionNotFound { .. } => ReturnCode::IncorrectConnectionId,
            GatewayError::CallIdMismatch { .. } => ReturnCode::IncorrectCallId,
            GatewayError::InvalidMode { .. } => ReturnCode::UnsupportedMode,
            GatewayError::UnsupportedPackage { .. } => ReturnCode::UnsupportedPackage,
            GatewayError::UnsupportedEvent { .. } | GatewayError::UnsupportedSignal { .. } => {
                ReturnCode::NoSuchEventOrSignal
            }
            GatewayError::UnsupportedSdp { .. } => ReturnCode::UnsupportedRemoteDescriptor,
            GatewayError::MissingRemoteDescription => ReturnCode::MissingRemoteDescriptor,
            GatewayError::MissingParameter { .. } | GatewayError::Protocol { .. } => ReturnCode::ProtocolError,
            GatewayError::InvalidParameter { .. } => ReturnCode::EventParameterError,
            GatewayError::UnsupportedCommand { .. } => ReturnCode::UnknownCommand,
            GatewayError::Aborted { .. } => ReturnCode::TransactionAborted,
            GatewayError::TransactionConflict { .. }
            | GatewayError::DuplicateNamespace { .. }
            | GatewayError::Config { .. }
            | GatewayError::Internal { .. } => ReturnCode::EndpointUnknown,
        }
    }

    /// Whether the call agent may retry the same request later
    pub fn is_transient(&self) -> bool {
        self.return_code().is_transient()
    }
}

impl From<rvoip_mgcp_core::Error> for GatewayError {
    fn from(error: rvoip_mgcp_core::Error) -> Self {
        match error {
            rvoip_mgcp_core::Error::InvalidMode(mode) => GatewayError::InvalidMode { mode },
            rvoip_mgcp_core::Error::InvalidParameter { name, reason } => {
                GatewayError::InvalidParameter { name, reason }
            }
            other => GatewayError::Protocol {
                message: other.to_string(),
            },
        }
    }
}

impl From<rvoip_mgcp_transport::Error> for GatewayError {
    fn from(error: rvoip_mgcp_transport::Error) -> Self {
        GatewayError::Transport {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_mapping() {
        assert_eq!(
            GatewayError::UnrecognizedEndpoint { endpoint: "ivr/9@gw".into() }.return_code().as_u16(),
            500
        );
        assert_eq!(
            GatewayError::TooManyConnections { endpoint: "ivr/1@gw".into(), max: 1 }.return_code().as_u16(),
            502
        );
        assert_eq!(GatewayError::resource_unavailable("player").return_code().as_u16(), 403);
        assert_eq!(GatewayError::illegal_state("busy").return_code().as_u16(), 400);
        assert_eq!(
            GatewayError::ConnectionNotFound { connection_id: "1F".into() }.return_code().as_u16(),
            515
        );
        assert_eq!(GatewayError::MissingRemoteDescription.return_code().as_u16(), 527);
        assert_eq!(GatewayError::Aborted { reason: "panic".into() }.return_code().as_u16(), 407);
        assert_eq!(
            GatewayError::UnsupportedCommand { verb: Verb::Epcf }.return_code().as_u16(),
            504
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::illegal_state("open in flight").is_transient());
        assert!(GatewayError::resource_unavailable("rtp").is_transient());
        assert!(!GatewayError::MissingRemoteDescription.is_transient());
    }

    #[test]
    fn test_wire_error_conversion() {
        let err: GatewayError = rvoip_mgcp_core::Error::InvalidMode("sideways".into()).into();
        assert_eq!(err.return_code().as_u16(), 517);

        let err: GatewayError = rvoip_mgcp_core::Error::parse("garbage").into();
        assert_eq!(err.return_code().as_u16(), 510);
    }
}
