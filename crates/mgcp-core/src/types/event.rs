//! # Events and Signals
//!
//! Event and signal names follow RFC 3435 Section 2.1.7:
//!
//! ```text
//! [package "/"] event-or-signal ["@" connection-id]
//! ```
//!
//! - `R:` carries [`RequestedEvent`]s: `AU/oc(N)`, `R/rto@1A(N)(100)`
//! - `S:` carries [`SignalRequest`]s: `AU/pa(an=welcome.wav it=2)`
//! - `O:` carries [`ObservedEvent`]s: `AU/oc(rc=100 dc=1234)`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::utils::{split_groups, split_top_level};

/// Fully qualified event or signal name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventName {
    /// Package name (`AU`, `D`, `R`), absent when the default package applies
    pub package: Option<String>,
    /// Event or signal code inside the package
    pub name: String,
    /// Connection the event applies to (`@id`, `@$` or `@*`)
    pub connection: Option<String>,
}

impl EventName {
    /// Build a name inside a package
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: Some(package.into()),
            name: name.into(),
            connection: None,
        }
    }

    /// Scope the name to a connection
    pub fn on_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection = Some(connection_id.into());
        self
    }

    /// Package, uppercased, or the empty string
    pub fn package_name(&self) -> String {
        self.package
            .as_deref()
            .map(str::to_ascii_uppercase)
            .unwrap_or_default()
    }

    /// Case-insensitive match on package and name, ignoring the connection
    pub fn matches(&self, other: &EventName) -> bool {
        self.package_name() == other.package_name() && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(package) = &self.package {
            write!(f, "{}/", package)?;
        }
        f.write_str(&self.name)?;
        if let Some(connection) = &self.connection {
            write!(f, "@{}", connection)?;
        }
        Ok(())
    }
}

impl FromStr for EventName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::parse("empty event name"));
        }

        let (body, connection) = match s.rsplit_once('@') {
            Some((body, conn)) if !conn.is_empty() => (body, Some(conn.to_string())),
            Some(_) => return Err(Error::parse(format!("empty connection in event name '{}'", s))),
            None => (s, None),
        };

        let (package, name) = match body.split_once('/') {
            Some((pkg, name)) => {
                if pkg.is_empty() {
                    return Err(Error::parse(format!("empty package in event name '{}'", s)));
                }
                (Some(pkg.to_string()), name)
            }
            None => (None, body),
        };

        if name.is_empty() {
            return Err(Error::parse(format!("empty event in event name '{}'", s)));
        }

        Ok(EventName {
            package,
            name: name.to_string(),
            connection,
        })
    }
}

/// Action requested for a detected event (RFC 3435 Section 2.3.3)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventAction {
    /// `N` - notify immediately
    Notify,
    /// `A` - accumulate
    Accumulate,
    /// `D` - treat according to digit map
    DigitMap,
    /// `S` - swap
    Swap,
    /// `I` - ignore
    Ignore,
    /// `K` - keep signals active
    KeepSignalsActive,
    /// `E(...)` - embedded notification request, kept verbatim
    Embedded(String),
}

impl EventAction {
    fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        let action = match token.to_ascii_uppercase().as_str() {
            "N" => EventAction::Notify,
            "A" => EventAction::Accumulate,
            "D" => EventAction::DigitMap,
            "S" => EventAction::Swap,
            "I" => EventAction::Ignore,
            "K" => EventAction::KeepSignalsActive,
            upper if upper.starts_with("E(") && upper.ends_with(')') => {
                EventAction::Embedded(token[2..token.len() - 1].to_string())
            }
            _ => return Err(Error::invalid_parameter("R", format!("unknown action '{}'", token))),
        };
        Ok(action)
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventAction::Notify => f.write_str("N"),
            EventAction::Accumulate => f.write_str("A"),
            EventAction::DigitMap => f.write_str("D"),
            EventAction::Swap => f.write_str("S"),
            EventAction::Ignore => f.write_str("I"),
            EventAction::KeepSignalsActive => f.write_str("K"),
            EventAction::Embedded(inner) => write!(f, "E({})", inner),
        }
    }
}

/// One entry of the `R:` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedEvent {
    /// Event to detect
    pub event: EventName,
    /// Actions to take, `N` when none were given
    pub actions: Vec<EventAction>,
    /// Event parameters, verbatim
    pub parameters: Option<String>,
}

impl RequestedEvent {
    /// Request notification of `event`
    pub fn notify(event: EventName) -> Self {
        Self {
            event,
            actions: vec![EventAction::Notify],
            parameters: None,
        }
    }

    /// Whether a detected event should trigger an NTFY
    pub fn wants_notification(&self) -> bool {
        self.actions.iter().any(|a| *a == EventAction::Notify)
    }

    /// Whether running signals must survive detection of this event
    pub fn keeps_signals(&self) -> bool {
        self.actions.iter().any(|a| *a == EventAction::KeepSignalsActive)
    }

    /// Parse an `R:` value into its entries
    pub fn parse_list(value: &str) -> Result<Vec<RequestedEvent>> {
        split_top_level(value, ',')
            .into_iter()
            .map(|item| item.parse())
            .collect()
    }
}

impl fmt::Display for RequestedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<String> = self.actions.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.event, actions.join(","))?;
        if let Some(params) = &self.parameters {
            write!(f, "({})", params)?;
        }
        Ok(())
    }
}

impl FromStr for RequestedEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, groups) = split_groups(s)?;
        let event: EventName = name.parse()?;

        let actions = match groups.first() {
            Some(group) => split_top_level(group, ',')
                .into_iter()
                .map(|action| EventAction::parse(&action))
                .collect::<Result<Vec<_>>>()?,
            None => vec![EventAction::Notify],
        };
        if groups.len() > 2 {
            return Err(Error::invalid_parameter("R", format!("too many groups in '{}'", s)));
        }

        Ok(RequestedEvent {
            event,
            actions: if actions.is_empty() { vec![EventAction::Notify] } else { actions },
            parameters: groups.get(1).cloned(),
        })
    }
}

/// Split `key=value` parameters separated by whitespace or commas
///
/// Values may be double quoted to include separators. Bare tokens yield an
/// empty value.
pub fn parse_parameter_pairs(raw: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let flush = |token: &mut String, pairs: &mut Vec<(String, String)>| {
        let trimmed = token.trim();
        if !trimmed.is_empty() {
            match trimmed.split_once('=') {
                Some((k, v)) => pairs.push((k.trim().to_string(), v.trim().trim_matches('"').to_string())),
                None => pairs.push((trimmed.to_string(), String::new())),
            }
        }
        token.clear();
    };

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ' ' | '\t' | ',' if !in_quotes => flush(&mut current, &mut pairs),
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut pairs);
    pairs
}

/// One entry of the `S:` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRequest {
    /// Signal to apply
    pub signal: EventName,
    /// Signal parameters, verbatim
    pub parameters: Option<String>,
}

impl SignalRequest {
    /// Parameters split into `key=value` pairs
    pub fn parameter_pairs(&self) -> Vec<(String, String)> {
        self.parameters
            .as_deref()
            .map(parse_parameter_pairs)
            .unwrap_or_default()
    }

    /// Value of a single signal parameter
    pub fn parameter(&self, key: &str) -> Option<String> {
        self.parameter_pairs()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Parse an `S:` value into its entries
    pub fn parse_list(value: &str) -> Result<Vec<SignalRequest>> {
        split_top_level(value, ',')
            .into_iter()
            .map(|item| item.parse())
            .collect()
    }
}

impl fmt::Display for SignalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signal)?;
        if let Some(params) = &self.parameters {
            write!(f, "({})", params)?;
        }
        Ok(())
    }
}

impl FromStr for SignalRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, groups) = split_groups(s)?;
        if groups.len() > 1 {
            return Err(Error::invalid_parameter("S", format!("too many groups in '{}'", s)));
        }
        Ok(SignalRequest {
            signal: name.parse()?,
            parameters: groups.into_iter().next(),
        })
    }
}

/// One entry of the `O:` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedEvent {
    /// Event that was detected
    pub event: EventName,
    /// Event parameters (`rc=100 dc=12`)
    pub parameters: Option<String>,
}

impl ObservedEvent {
    /// Observed event without parameters
    pub fn new(event: EventName) -> Self {
        Self { event, parameters: None }
    }

    /// Observed event carrying parameters
    pub fn with_parameters(event: EventName, parameters: impl Into<String>) -> Self {
        Self {
            event,
            parameters: Some(parameters.into()),
        }
    }

    /// Render a list for an `O:` line
    pub fn render_list(events: &[ObservedEvent]) -> String {
        events
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ObservedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event)?;
        if let Some(params) = &self.parameters {
            write!(f, "({})", params)?;
        }
        Ok(())
    }
}

impl FromStr for ObservedEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, groups) = split_groups(s)?;
        Ok(ObservedEvent {
            event: name.parse()?,
            parameters: groups.into_iter().next(),
        })
    }
}
