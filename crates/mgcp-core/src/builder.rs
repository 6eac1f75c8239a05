//! Fluent builders for MGCP requests and responses
//!
//! ```rust
//! use rvoip_mgcp_core::builder::{RequestBuilder, ResponseBuilder};
//! use rvoip_mgcp_core::{ConnectionMode, ReturnCode, TransactionId, Verb};
//!
//! let request = RequestBuilder::new(Verb::Crcx, TransactionId(10), "bridge/$@gw".parse().unwrap())
//!     .call_id("CALL-1")
//!     .mode(ConnectionMode::SendRecv)
//!     .build();
//! assert_eq!(request.verb, Verb::Crcx);
//!
//! let response = ResponseBuilder::new(ReturnCode::TransactionExecuted, TransactionId(10))
//!     .connection_id("1F")
//!     .build();
//! assert!(response.code.is_success());
//! ```

use crate::message::{MgcpRequest, MgcpResponse};
use crate::types::{ConnectionMode, EndpointId, ParameterName, ReturnCode, TransactionId, Verb};

/// Builder for [`MgcpRequest`]
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: MgcpRequest,
}

impl RequestBuilder {
    /// Start a request
    pub fn new(verb: Verb, transaction_id: TransactionId, endpoint: EndpointId) -> Self {
        Self {
            request: MgcpRequest::new(verb, transaction_id, endpoint),
        }
    }

    /// Set an arbitrary parameter
    pub fn parameter(mut self, name: ParameterName, value: impl Into<String>) -> Self {
        self.request.parameters.insert(name, value);
        self
    }

    /// `C:`
    pub fn call_id(self, call_id: impl Into<String>) -> Self {
        self.parameter(ParameterName::CallId, call_id)
    }

    /// `I:`
    pub fn connection_id(self, connection_id: impl Into<String>) -> Self {
        self.parameter(ParameterName::ConnectionId, connection_id)
    }

    /// `M:`
    pub fn mode(self, mode: ConnectionMode) -> Self {
        self.parameter(ParameterName::ConnectionMode, mode.as_str())
    }

    /// `Z2:`
    pub fn second_endpoint(self, endpoint: &EndpointId) -> Self {
        self.parameter(ParameterName::SecondEndpointId, endpoint.to_string())
    }

    /// `N:`
    pub fn notified_entity(self, entity: impl Into<String>) -> Self {
        self.parameter(ParameterName::NotifiedEntity, entity)
    }

    /// `X:`
    pub fn request_id(self, request_id: impl Into<String>) -> Self {
        self.parameter(ParameterName::RequestIdentifier, request_id)
    }

    /// Attach a session description
    pub fn sdp(mut self, sdp: impl Into<String>) -> Self {
        self.request.sdp = Some(sdp.into());
        self
    }

    /// Finish the request
    pub fn build(self) -> MgcpRequest {
        self.request
    }
}

/// Builder for [`MgcpResponse`]
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    response: MgcpResponse,
}

impl ResponseBuilder {
    /// Start a response with the canonical reason text
    pub fn new(code: ReturnCode, transaction_id: TransactionId) -> Self {
        Self {
            response: MgcpResponse::new(code, transaction_id),
        }
    }

    /// Replace the commentary text
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.response.message = message.into();
        self
    }

    /// Set an arbitrary parameter
    pub fn parameter(mut self, name: ParameterName, value: impl Into<String>) -> Self {
        self.response.parameters.insert(name, value);
        self
    }

    /// Append a parameter that may repeat
    pub fn append(mut self, name: ParameterName, value: impl Into<String>) -> Self {
        self.response.parameters.append(name, value);
        self
    }

    /// `I:`
    pub fn connection_id(self, connection_id: impl Into<String>) -> Self {
        self.parameter(ParameterName::ConnectionId, connection_id)
    }

    /// `Z:`
    pub fn specific_endpoint(self, endpoint: &EndpointId) -> Self {
        self.append(ParameterName::SpecificEndpointId, endpoint.to_string())
    }

    /// Attach a session description
    pub fn sdp(mut self, sdp: impl Into<String>) -> Self {
        self.response.sdp = Some(sdp.into());
        self
    }

    /// Finish the response
    pub fn build(self) -> MgcpResponse {
        self.response
    }
}
