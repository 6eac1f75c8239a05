// Connection and call identifiers

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Gateway-wide unique connection identifier, rendered as uppercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate a fresh identifier; identifiers are never reused
    pub fn next() -> Self {
        let value = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:X}", value))
    }

    /// Wrap an identifier received on the wire
    ///
    /// Identifiers are hexadecimal, so they compare case-insensitively.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Call identifier (`C:`) chosen by the call agent
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison with a raw `C:` value
    pub fn matches(&self, raw: &str) -> bool {
        self.0.eq_ignore_ascii_case(raw.trim())
    }
}

impl PartialEq for CallId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique_hex() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(ConnectionId::new("1f"), ConnectionId::new("1F"));
    }

    #[test]
    fn test_call_id_comparison() {
        let call = CallId::new("A3C47F21456789F0");
        assert!(call.matches("a3c47f21456789f0"));
        assert_eq!(call, CallId::new("a3c47f21456789f0 "));
        assert!(!call.matches("other"));
    }
}
