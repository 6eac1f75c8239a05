//! # MGCP Endpoint Identifiers
//!
//! Endpoints are named `local-name@domain` (RFC 3435 Section 2.1.1). The local
//! name is a `/`-separated path such as `ivr/1` or `bridge/12`. The last path
//! segment may be a wildcard:
//!
//! - `$` - "any free" endpoint in the namespace
//! - `*` - "all" endpoints in the namespace
//!
//! The *namespace* of an identifier is its local name up to and including the
//! last `/` (for `ivr/1` that is `ivr/`).
//!
//! ```rust
//! use rvoip_mgcp_core::{EndpointId, Wildcard};
//!
//! let id: EndpointId = "ivr/$@mgw.example.net".parse().unwrap();
//! assert_eq!(id.namespace(), "ivr/");
//! assert_eq!(id.wildcard(), Some(Wildcard::Any));
//! assert_eq!(id.to_string(), "ivr/$@mgw.example.net");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wildcard kind carried by the last segment of a local name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Wildcard {
    /// `$`: any endpoint that can accept another connection
    Any,
    /// `*`: every endpoint of the namespace
    All,
}

impl Wildcard {
    /// Wire token for the wildcard
    pub fn as_str(&self) -> &'static str {
        match self {
            Wildcard::Any => "$",
            Wildcard::All => "*",
        }
    }
}

/// Structural MGCP endpoint identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId {
    local_name: String,
    domain: String,
}

impl EndpointId {
    /// Create an identifier from its two halves
    pub fn new(local_name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            domain: domain.into(),
        }
    }

    /// Local name (`ivr/1`)
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Domain part (`mgw.example.net`, possibly with `:port`)
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Namespace prefix, including the trailing `/`
    ///
    /// A local name without any `/` has an empty namespace.
    pub fn namespace(&self) -> &str {
        match self.local_name.rfind('/') {
            Some(idx) => &self.local_name[..=idx],
            None => "",
        }
    }

    /// Last segment of the local name
    pub fn suffix(&self) -> &str {
        match self.local_name.rfind('/') {
            Some(idx) => &self.local_name[idx + 1..],
            None => &self.local_name,
        }
    }

    /// Wildcard carried by the last segment, if any
    pub fn wildcard(&self) -> Option<Wildcard> {
        match self.suffix() {
            "$" => Some(Wildcard::Any),
            "*" => Some(Wildcard::All),
            _ => None,
        }
    }

    /// Whether this identifier names more than one possible endpoint
    pub fn is_wildcard(&self) -> bool {
        self.wildcard().is_some()
    }

    /// Lowercased `local@domain` form used as a lookup key
    ///
    /// RFC 3435 endpoint names are case insensitive.
    pub fn key(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_name, self.domain)
    }
}

impl FromStr for EndpointId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (local, domain) = s
            .rsplit_once('@')
            .ok_or_else(|| Error::InvalidEndpointId(format!("missing '@' in {}", s)))?;

        if local.is_empty() {
            return Err(Error::InvalidEndpointId(format!("empty local name in {}", s)));
        }
        if domain.is_empty() {
            return Err(Error::InvalidEndpointId(format!("empty domain in {}", s)));
        }
        if local.split('/').any(|segment| segment.is_empty()) && !local.ends_with('/') {
            return Err(Error::InvalidEndpointId(format!("empty path segment in {}", s)));
        }
        if local.chars().any(|c| c.is_whitespace()) || domain.chars().any(|c| c.is_whitespace()) {
            return Err(Error::InvalidEndpointId(format!("whitespace in {}", s)));
        }

        Ok(EndpointId::new(local, domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_identifier() {
        let id: EndpointId = "mobicents/ivr/12@127.0.0.1:2427".parse().unwrap();
        assert_eq!(id.local_name(), "mobicents/ivr/12");
        assert_eq!(id.domain(), "127.0.0.1:2427");
        assert_eq!(id.namespace(), "mobicents/ivr/");
        assert_eq!(id.suffix(), "12");
        assert!(!id.is_wildcard());
    }

    #[test]
    fn test_wildcards() {
        let any: EndpointId = "bridge/$@gw".parse().unwrap();
        let all: EndpointId = "bridge/*@gw".parse().unwrap();
        assert_eq!(any.wildcard(), Some(Wildcard::Any));
        assert_eq!(all.wildcard(), Some(Wildcard::All));
        assert_eq!(any.namespace(), all.namespace());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!("ivr/1".parse::<EndpointId>().is_err());
        assert!("@gw".parse::<EndpointId>().is_err());
        assert!("ivr/1@".parse::<EndpointId>().is_err());
        assert!("ivr//1@gw".parse::<EndpointId>().is_err());
    }

    #[test]
    fn test_structural_equality_and_key() {
        let a = EndpointId::new("IVR/1", "GW");
        let b: EndpointId = "IVR/1@GW".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.key(), "ivr/1@gw");
    }
}
