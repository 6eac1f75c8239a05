use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection lifecycle
///
/// ```text
/// NULL ──half_open──▶ HALF_OPEN ──open──▶ OPEN ──close──▶ CLOSED
///   └────────────────────open────────────────▲
/// ```
///
/// Renegotiation keeps a connection in OPEN. CLOSED is terminal and reachable
/// from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Null,
    HalfOpen,
    Open,
    Closed,
}

impl ConnectionState {
    /// Position in the lifecycle, used to check monotonicity
    pub fn rank(&self) -> u8 {
        match self {
            ConnectionState::Null => 0,
            ConnectionState::HalfOpen => 1,
            ConnectionState::Open => 2,
            ConnectionState::Closed => 3,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Null => write!(f, "NULL"),
            ConnectionState::HalfOpen => write!(f, "HALF_OPEN"),
            ConnectionState::Open => write!(f, "OPEN"),
            ConnectionState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Which side of the gateway a connection faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Towards a remote RTP peer
    Remote,
    /// Bridged to a connection on another endpoint of this gateway
    Local,
}

/// Connection timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTimeouts {
    /// Longest time in HALF_OPEN before the connection is closed (zero disables)
    pub half_open: Duration,
    /// Longest lifetime from OPEN (`None` for unlimited)
    pub lifetime: Option<Duration>,
}

impl Default for ConnectionTimeouts {
    fn default() -> Self {
        Self {
            half_open: Duration::from_secs(30),
            lifetime: None,
        }
    }
}
