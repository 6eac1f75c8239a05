//! MGCP parameter lines (`CODE: value`)
//!
//! Parameter codes are case insensitive on the wire. [`Parameters`] keeps the
//! lines in the order they were added and replaces an existing value when the
//! same code is set twice.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parameter codes from RFC 3435 Section 3.2.2
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterName {
    /// `K` - response acknowledgement
    ResponseAck,
    /// `B` - bearer information
    BearerInformation,
    /// `C` - call id
    CallId,
    /// `I` - connection id
    ConnectionId,
    /// `I2` - second connection id
    SecondConnectionId,
    /// `N` - notified entity
    NotifiedEntity,
    /// `X` - request identifier
    RequestIdentifier,
    /// `L` - local connection options
    LocalConnectionOptions,
    /// `M` - connection mode
    ConnectionMode,
    /// `R` - requested events
    RequestedEvents,
    /// `S` - signal requests
    SignalRequests,
    /// `D` - digit map
    DigitMap,
    /// `O` - observed events
    ObservedEvents,
    /// `P` - connection parameters
    ConnectionParameters,
    /// `E` - reason code
    ReasonCode,
    /// `Z` - specific endpoint id
    SpecificEndpointId,
    /// `Z2` - second endpoint id
    SecondEndpointId,
    /// `F` - requested info
    RequestedInfo,
    /// `Q` - quarantine handling
    QuarantineHandling,
    /// `T` - detect events
    DetectEvents,
    /// `RM` - restart method
    RestartMethod,
    /// `RD` - restart delay
    RestartDelay,
    /// `ES` - event states
    EventStates,
    /// `A` - capabilities
    Capabilities,
    /// `RC` - remote connection descriptor
    RemoteConnectionDescriptor,
    /// `LC` - local connection descriptor
    LocalConnectionDescriptor,
    /// Extension parameter (`X-...` or vendor specific)
    Other(String),
}

impl ParameterName {
    /// Wire code
    pub fn as_str(&self) -> &str {
        match self {
            ParameterName::ResponseAck => "K",
            ParameterName::BearerInformation => "B",
            ParameterName::CallId => "C",
            ParameterName::ConnectionId => "I",
            ParameterName::SecondConnectionId => "I2",
            ParameterName::NotifiedEntity => "N",
            ParameterName::RequestIdentifier => "X",
            ParameterName::LocalConnectionOptions => "L",
            ParameterName::ConnectionMode => "M",
            ParameterName::RequestedEvents => "R",
            ParameterName::SignalRequests => "S",
            ParameterName::DigitMap => "D",
            ParameterName::ObservedEvents => "O",
            ParameterName::ConnectionParameters => "P",
            ParameterName::ReasonCode => "E",
            ParameterName::SpecificEndpointId => "Z",
            ParameterName::SecondEndpointId => "Z2",
            ParameterName::RequestedInfo => "F",
            ParameterName::QuarantineHandling => "Q",
            ParameterName::DetectEvents => "T",
            ParameterName::RestartMethod => "RM",
            ParameterName::RestartDelay => "RD",
            ParameterName::EventStates => "ES",
            ParameterName::Capabilities => "A",
            ParameterName::RemoteConnectionDescriptor => "RC",
            ParameterName::LocalConnectionDescriptor => "LC",
            ParameterName::Other(name) => name,
        }
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim();
        if code.is_empty() {
            return Err(Error::parse("empty parameter code"));
        }
        let name = match code.to_ascii_uppercase().as_str() {
            "K" => ParameterName::ResponseAck,
            "B" => ParameterName::BearerInformation,
            "C" => ParameterName::CallId,
            "I" => ParameterName::ConnectionId,
            "I2" => ParameterName::SecondConnectionId,
            "N" => ParameterName::NotifiedEntity,
            "X" => ParameterName::RequestIdentifier,
            "L" => ParameterName::LocalConnectionOptions,
            "M" => ParameterName::ConnectionMode,
            "R" => ParameterName::RequestedEvents,
            "S" => ParameterName::SignalRequests,
            "D" => ParameterName::DigitMap,
            "O" => ParameterName::ObservedEvents,
            "P" => ParameterName::ConnectionParameters,
            "E" => ParameterName::ReasonCode,
            "Z" => ParameterName::SpecificEndpointId,
            "Z2" => ParameterName::SecondEndpointId,
            "F" => ParameterName::RequestedInfo,
            "Q" => ParameterName::QuarantineHandling,
            "T" => ParameterName::DetectEvents,
            "RM" => ParameterName::RestartMethod,
            "RD" => ParameterName::RestartDelay,
            "ES" => ParameterName::EventStates,
            "A" => ParameterName::Capabilities,
            "RC" => ParameterName::RemoteConnectionDescriptor,
            "LC" => ParameterName::LocalConnectionDescriptor,
            _ => ParameterName::Other(code.to_string()),
        };
        Ok(name)
    }
}

/// Ordered parameter list of a request or response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    entries: Vec<(ParameterName, String)>,
}

impl Parameters {
    /// Empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value for the same code
    pub fn insert(&mut self, name: ParameterName, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Append a parameter even if the code is already present (used for repeated `Z:` lines)
    pub fn append(&mut self, name: ParameterName, value: impl Into<String>) {
        self.entries.push((name, value.into()));
    }

    /// Value of the first occurrence of `name`
    pub fn get(&self, name: &ParameterName) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value recorded for `name`
    pub fn get_all<'a>(&'a self, name: &'a ParameterName) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `name` is present
    pub fn contains(&self, name: &ParameterName) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Remove all values for `name`, returning the first one
    pub fn remove(&mut self, name: &ParameterName) -> Option<String> {
        let first = self.get(name).map(str::to_string);
        self.entries.retain(|(n, _)| n != name);
        first
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&ParameterName, &str)> {
        self.entries.iter().map(|(n, v)| (n, v.as_str()))
    }

    /// Number of parameter lines
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no parameters
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_case_insensitive() {
        assert_eq!("z2".parse::<ParameterName>().unwrap(), ParameterName::SecondEndpointId);
        assert_eq!("c".parse::<ParameterName>().unwrap(), ParameterName::CallId);
        assert_eq!(
            "X-Foo".parse::<ParameterName>().unwrap(),
            ParameterName::Other("X-Foo".to_string())
        );
    }

    #[test]
    fn test_insert_replaces_and_append_keeps() {
        let mut params = Parameters::new();
        params.insert(ParameterName::CallId, "1");
        params.insert(ParameterName::CallId, "2");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get(&ParameterName::CallId), Some("2"));

        params.append(ParameterName::SpecificEndpointId, "a/1@gw");
        params.append(ParameterName::SpecificEndpointId, "a/2@gw");
        let all: Vec<_> = params.get_all(&ParameterName::SpecificEndpointId).collect();
        assert_eq!(all, vec!["a/1@gw", "a/2@gw"]);
    }
}
