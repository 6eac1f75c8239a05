//! Connection modes (RFC 3435 Section 3.2.2.6)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Directionality of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Media is only sent
    SendOnly,
    /// Media is only received
    RecvOnly,
    /// Media flows both ways
    SendRecv,
    /// Conference mode
    Conference,
    /// No media flows
    Inactive,
    /// Received media is looped back
    Loopback,
    /// Continuity test
    ContinuityTest,
    /// Network loopback
    NetworkLoop,
    /// Network continuity test
    NetworkTest,
}

impl ConnectionMode {
    /// Wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::SendOnly => "sendonly",
            ConnectionMode::RecvOnly => "recvonly",
            ConnectionMode::SendRecv => "sendrecv",
            ConnectionMode::Conference => "confrnce",
            ConnectionMode::Inactive => "inactive",
            ConnectionMode::Loopback => "loopback",
            ConnectionMode::ContinuityTest => "conttest",
            ConnectionMode::NetworkLoop => "netwloop",
            ConnectionMode::NetworkTest => "netwtest",
        }
    }

    /// Whether media received from the network is forwarded into the endpoint
    pub fn can_receive(&self) -> bool {
        matches!(
            self,
            ConnectionMode::RecvOnly | ConnectionMode::SendRecv | ConnectionMode::Conference
        )
    }

    /// Whether media produced by the endpoint is sent out
    pub fn can_send(&self) -> bool {
        matches!(
            self,
            ConnectionMode::SendOnly | ConnectionMode::SendRecv | ConnectionMode::Conference
        )
    }
}

impl Default for ConnectionMode {
    fn default() -> Self {
        ConnectionMode::Inactive
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mode = match s.trim().to_ascii_lowercase().as_str() {
            "sendonly" => ConnectionMode::SendOnly,
            "recvonly" => ConnectionMode::RecvOnly,
            "sendrecv" => ConnectionMode::SendRecv,
            "confrnce" => ConnectionMode::Conference,
            "inactive" => ConnectionMode::Inactive,
            "loopback" => ConnectionMode::Loopback,
            "conttest" => ConnectionMode::ContinuityTest,
            "netwloop" => ConnectionMode::NetworkLoop,
            "netwtest" => ConnectionMode::NetworkTest,
            other => return Err(Error::InvalidMode(other.to_string())),
        };
        Ok(mode)
    }
}
