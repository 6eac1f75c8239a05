//! MGCP command verbs and transaction identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Command verbs defined by RFC 3435 Section 2.3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    /// EndpointConfiguration
    Epcf,
    /// CreateConnection
    Crcx,
    /// ModifyConnection
    Mdcx,
    /// DeleteConnection
    Dlcx,
    /// NotificationRequest
    Rqnt,
    /// Notify
    Ntfy,
    /// AuditEndpoint
    Auep,
    /// AuditConnection
    Aucx,
    /// RestartInProgress
    Rsip,
}

impl Verb {
    /// Four letter wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Epcf => "EPCF",
            Verb::Crcx => "CRCX",
            Verb::Mdcx => "MDCX",
            Verb::Dlcx => "DLCX",
            Verb::Rqnt => "RQNT",
            Verb::Ntfy => "NTFY",
            Verb::Auep => "AUEP",
            Verb::Aucx => "AUCX",
            Verb::Rsip => "RSIP",
        }
    }

    /// All verbs, in RFC order
    pub fn all() -> &'static [Verb] {
        &[
            Verb::Epcf,
            Verb::Crcx,
            Verb::Mdcx,
            Verb::Dlcx,
            Verb::Rqnt,
            Verb::Ntfy,
            Verb::Auep,
            Verb::Aucx,
            Verb::Rsip,
        ]
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Verb::all()
            .iter()
            .copied()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownVerb(s.to_string()))
    }
}

/// Transaction identifier (RFC 3435 Section 3.2.1.2: 1 to 999999999)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u32);

impl TransactionId {
    /// Largest legal transaction identifier
    pub const MAX: u32 = 999_999_999;

    /// Create a transaction id, rejecting values outside the RFC range
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 || value > Self::MAX {
            return Err(Error::InvalidTransactionId(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Raw numeric value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The id following this one, wrapping back to 1 after [`TransactionId::MAX`]
    pub fn next(&self) -> Self {
        if self.0 >= Self::MAX {
            Self(1)
        } else {
            Self(self.0 + 1)
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > 9 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidTransactionId(s.to_string()));
        }
        let value = s
            .parse::<u32>()
            .map_err(|_| Error::InvalidTransactionId(s.to_string()))?;
        TransactionId::new(value)
    }
}
