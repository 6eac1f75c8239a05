//! Local connection options (`L:` parameter, RFC 3435 Section 3.2.2.10)
//!
//! The value is a comma separated list of `key:value` pairs, for example
//! `p:20, a:PCMU;PCMA, e:on, webrtc:true`. Keys this gateway understands get
//! typed accessors; every pair is kept so nothing is lost when the options are
//! echoed back in an audit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::utils::split_top_level;

/// Parsed `L:` parameter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConnectionOptions {
    entries: Vec<(String, String)>,
}

impl LocalConnectionOptions {
    /// Empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an option
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Add or replace an option in place
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into().to_ascii_lowercase();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Raw value of an option
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Codec names from `a:` (`;` separated)
    pub fn codecs(&self) -> Vec<String> {
        self.get("a")
            .map(|v| {
                v.split(';')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Packetization period in milliseconds from `p:`
    ///
    /// A range such as `10-20` yields its lower bound.
    pub fn packetization_ms(&self) -> Option<u32> {
        self.get("p")
            .and_then(|v| v.split('-').next())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Echo cancellation (`e:on` / `e:off`)
    pub fn echo_cancellation(&self) -> Option<bool> {
        match self.get("e").map(|v| v.to_ascii_lowercase()) {
            Some(v) if v == "on" => Some(true),
            Some(v) if v == "off" => Some(false),
            _ => None,
        }
    }

    /// Whether the connection is a WebRTC leg (`webrtc:true`)
    pub fn is_webrtc(&self) -> bool {
        self.get("webrtc")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Iterate over all options
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when no option was given
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for LocalConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();
        f.write_str(&rendered.join(", "))
    }
}

impl FromStr for LocalConnectionOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut options = LocalConnectionOptions::new();
        for item in split_top_level(s, ',') {
            let (key, value) = item
                .split_once(':')
                .ok_or_else(|| Error::invalid_parameter("L", format!("expected key:value, got '{}'", item)))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::invalid_parameter("L", "empty option name"));
            }
            options.set(key, value.trim());
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let options: LocalConnectionOptions = "p:20, a:PCMU;PCMA, e:off, webrtc:true".parse().unwrap();
        assert_eq!(options.packetization_ms(), Some(20));
        assert_eq!(options.codecs(), vec!["PCMU".to_string(), "PCMA".to_string()]);
        assert_eq!(options.echo_cancellation(), Some(false));
        assert!(options.is_webrtc());
    }

    #[test]
    fn test_packetization_range_and_rendering() {
        let options: LocalConnectionOptions = "P:10-20".parse().unwrap();
        assert_eq!(options.packetization_ms(), Some(10));
        assert_eq!(options.to_string(), "p:10-20");
        assert!("p20".parse::<LocalConnectionOptions>().is_err());
    }
}
