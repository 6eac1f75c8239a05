//! # MGCP Messages
//!
//! Requests and responses as exchanged between a call agent and a media
//! gateway (RFC 3435 Section 3). Both render to their wire form through
//! [`Display`](std::fmt::Display):
//!
//! ```text
//! CRCX 1204 bridge/$@mgw.example.net MGCP 1.0
//! C: A3C47F21456789F0
//! M: recvonly
//!
//! v=0
//! ...
//! ```
//!
//! ```text
//! 200 1204 OK
//! I: 1F
//! Z: bridge/1@mgw.example.net
//!
//! v=0
//! ...
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{EndpointId, ParameterName, Parameters, ReturnCode, TransactionId, Verb};

/// Protocol version used when none is given
pub const MGCP_VERSION: &str = "MGCP 1.0";

/// An MGCP command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MgcpRequest {
    /// Command verb
    pub verb: Verb,
    /// Transaction identifier
    pub transaction_id: TransactionId,
    /// Target endpoint (possibly wildcarded)
    pub endpoint: EndpointId,
    /// Protocol version string (`MGCP 1.0`, optionally followed by a profile)
    pub version: String,
    /// Parameter lines
    pub parameters: Parameters,
    /// Session description following the empty line
    pub sdp: Option<String>,
}

impl MgcpRequest {
    /// Create a request with no parameters
    pub fn new(verb: Verb, transaction_id: TransactionId, endpoint: EndpointId) -> Self {
        Self {
            verb,
            transaction_id,
            endpoint,
            version: MGCP_VERSION.to_string(),
            parameters: Parameters::new(),
            sdp: None,
        }
    }

    /// Value of a parameter
    pub fn parameter(&self, name: &ParameterName) -> Option<&str> {
        self.parameters.get(name)
    }
}

impl fmt::Display for MgcpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}\r\n",
            self.verb, self.transaction_id, self.endpoint, self.version
        )?;
        write_parameters(f, &self.parameters)?;
        write_sdp(f, self.sdp.as_deref())
    }
}

/// An MGCP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MgcpResponse {
    /// Return code
    pub code: ReturnCode,
    /// Transaction identifier of the request this answers
    pub transaction_id: TransactionId,
    /// Commentary text
    pub message: String,
    /// Parameter lines
    pub parameters: Parameters,
    /// Session description following the empty line
    pub sdp: Option<String>,
}

impl MgcpResponse {
    /// Create a response carrying the canonical reason text of `code`
    pub fn new(code: ReturnCode, transaction_id: TransactionId) -> Self {
        Self {
            code,
            transaction_id,
            message: code.reason().to_string(),
            parameters: Parameters::new(),
            sdp: None,
        }
    }

    /// Create a response with custom commentary text
    pub fn with_message(code: ReturnCode, transaction_id: TransactionId, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::new(code, transaction_id)
        }
    }

    /// Value of a parameter
    pub fn parameter(&self, name: &ParameterName) -> Option<&str> {
        self.parameters.get(name)
    }
}

impl fmt::Display for MgcpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} {}\r\n", self.code, self.transaction_id)?;
        } else {
            write!(f, "{} {} {}\r\n", self.code, self.transaction_id, self.message)?;
        }
        write_parameters(f, &self.parameters)?;
        write_sdp(f, self.sdp.as_deref())
    }
}

/// Either side of an MGCP exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MgcpMessage {
    /// A command
    Request(MgcpRequest),
    /// A response to a command
    Response(MgcpResponse),
}

impl MgcpMessage {
    /// Transaction id of the message
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            MgcpMessage::Request(request) => request.transaction_id,
            MgcpMessage::Response(response) => response.transaction_id,
        }
    }

    /// Whether this is a request
    pub fn is_request(&self) -> bool {
        matches!(self, MgcpMessage::Request(_))
    }

    /// Serialize to bytes for the transport
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for MgcpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MgcpMessage::Request(request) => request.fmt(f),
            MgcpMessage::Response(response) => response.fmt(f),
        }
    }
}

impl From<MgcpRequest> for MgcpMessage {
    fn from(request: MgcpRequest) -> Self {
        MgcpMessage::Request(request)
    }
}

impl From<MgcpResponse> for MgcpMessage {
    fn from(response: MgcpResponse) -> Self {
        MgcpMessage::Response(response)
    }
}

fn write_parameters(f: &mut fmt::Formatter<'_>, parameters: &Parameters) -> fmt::Result {
    for (name, value) in parameters.iter() {
        write!(f, "{}: {}\r\n", name, value)?;
    }
    Ok(())
}

fn write_sdp(f: &mut fmt::Formatter<'_>, sdp: Option<&str>) -> fmt::Result {
    if let Some(sdp) = sdp {
        f.write_str("\r\n")?;
        for line in sdp.lines() {
            write!(f, "{}\r\n", line.trim_end_matches('\r'))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rendering() {
        let mut request = MgcpRequest::new(
            Verb::Crcx,
            TransactionId(1204),
            "bridge/$@mgw".parse().unwrap(),
        );
        request.parameters.insert(ParameterName::CallId, "A3C4");
        request.parameters.insert(ParameterName::ConnectionMode, "recvonly");
        request.sdp = Some("v=0\nc=IN IP4 10.0.0.1".to_string());

        assert_eq!(
            request.to_string(),
            "CRCX 1204 bridge/$@mgw MGCP 1.0\r\nC: A3C4\r\nM: recvonly\r\n\r\nv=0\r\nc=IN IP4 10.0.0.1\r\n"
        );
    }

    #[test]
    fn test_response_rendering() {
        let mut response = MgcpResponse::with_message(ReturnCode::TransactionExecuted, TransactionId(7), "OK");
        response.parameters.insert(ParameterName::ConnectionId, "1F");
        assert_eq!(response.to_string(), "200 7 OK\r\nI: 1F\r\n");

        let bare = MgcpResponse::with_message(ReturnCode::ConnectionDeleted, TransactionId(8), "");
        assert_eq!(bare.to_string(), "250 8\r\n");
    }
}
