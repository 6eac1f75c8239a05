//! # Event and Signal Packages
//!
//! The packages the gateway understands, as a compile-time table. Each
//! package lists its events, with the scope they are detected in, and its
//! signals, each with a constructor that turns an `S:` entry into a
//! [`SignalSpec`].
//!
//! | package | events | signals |
//! |---------|--------|---------|
//! | `AU` advanced audio | `oc`, `of` | `pa`, `pc`, `pr`, `es` |
//! | `D` DTMF | `0`-`9`, `*`, `#`, `A`-`D`, `X`, `T` | |
//! | `R` RTP | `rto`, `iceto` (connection scope) | |
//!
//! Advanced audio timers are expressed in units of 100 ms.

use std::fmt;
use std::time::Duration;

use rvoip_mgcp_core::{EventName, SignalRequest};

use crate::errors::{GatewayError, Result};

/// Where an event is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventScope {
    Endpoint,
    /// Detected on a connection; the request may name one with `@id`
    Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDefinition {
    pub name: &'static str,
    pub scope: EventScope,
    pub description: &'static str,
}

/// What a signal asks the endpoint to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalSpec {
    PlayAnnouncement {
        uri: String,
        iterations: u32,
    },
    PlayCollect {
        prompt: Option<String>,
        max_digits: usize,
        first_digit_timeout: Duration,
    },
    PlayRecord {
        prompt: Option<String>,
        uri: String,
        max_duration: Duration,
    },
    /// Stop whatever signal is running
    EndSignal,
}

/// Builds a [`SignalSpec`] from a requested signal
pub type SignalConstructor = fn(&SignalRequest) -> Result<SignalSpec>;

#[derive(Clone, Copy)]
pub struct SignalDefinition {
    pub name: &'static str,
    pub constructor: SignalConstructor,
}

impl fmt::Debug for SignalDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalDefinition").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub struct Package {
    pub name: &'static str,
    pub description: &'static str,
    pub events: &'static [EventDefinition],
    pub signals: &'static [SignalDefinition],
}

impl Package {
    pub fn event(&self, name: &str) -> Option<&'static EventDefinition> {
        self.events.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn signal(&self, name: &str) -> Option<&'static SignalDefinition> {
        self.signals.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

const fn endpoint_event(name: &'static str, description: &'static str) -> EventDefinition {
    EventDefinition {
        name,
        scope: EventScope::Endpoint,
        description,
    }
}

fn parameter_u32(request: &SignalRequest, key: &str) -> Result<Option<u32>> {
    match request.parameter(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| GatewayError::invalid_parameter(key, format!("'{}' is not a number", raw))),
    }
}

fn hundred_ms(units: u32) -> Duration {
    Duration::from_millis(u64::from(units) * 100)
}

fn play_announcement(request: &SignalRequest) -> Result<SignalSpec> {
    let uri = request
        .parameter("an")
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| GatewayError::invalid_parameter("an", "announcement is required"))?;
    Ok(SignalSpec::PlayAnnouncement {
        uri,
        iterations: parameter_u32(request, "it")?.unwrap_or(1).max(1),
    })
}

fn play_collect(request: &SignalRequest) -> Result<SignalSpec> {
    let max_digits = parameter_u32(request, "mx")?.unwrap_or(1);
    if max_digits == 0 {
        return Err(GatewayError::invalid_parameter("mx", "must be at least 1"));
    }
    Ok(SignalSpec::PlayCollect {
        prompt: request.parameter("ip").filter(|p| !p.is_empty()),
        max_digits: max_digits as usize,
        first_digit_timeout: hundred_ms(parameter_u32(request, "fdt")?.unwrap_or(50)),
    })
}

fn play_record(request: &SignalRequest) -> Result<SignalSpec> {
    let uri = request
        .parameter("ri")
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| GatewayError::invalid_parameter("ri", "recording id is required"))?;
    Ok(SignalSpec::PlayRecord {
        prompt: request.parameter("ip").filter(|p| !p.is_empty()),
        uri,
        max_duration: hundred_ms(parameter_u32(request, "rlt")?.unwrap_or(600)),
    })
}

fn end_signal(_request: &SignalRequest) -> Result<SignalSpec> {
    Ok(SignalSpec::EndSignal)
}

static ADVANCED_AUDIO: Package = Package {
    name: "AU",
    description: "Advanced audio",
    events: &[
        endpoint_event("oc", "operation complete"),
        endpoint_event("of", "operation failed"),
    ],
    signals: &[
        SignalDefinition {
            name: "pa",
            constructor: play_announcement,
        },
        SignalDefinition {
            name: "pc",
            constructor: play_collect,
        },
        SignalDefinition {
            name: "pr",
            constructor: play_record,
        },
        SignalDefinition {
            name: "es",
            constructor: end_signal,
        },
    ],
};

static DTMF: Package = Package {
    name: "D",
    description: "DTMF",
    events: &[
        endpoint_event("0", "digit 0"),
        endpoint_event("1", "digit 1"),
        endpoint_event("2", "digit 2"),
        endpoint_event("3", "digit 3"),
        endpoint_event("4", "digit 4"),
        endpoint_event("5", "digit 5"),
        endpoint_event("6", "digit 6"),
        endpoint_event("7", "digit 7"),
        endpoint_event("8", "digit 8"),
        endpoint_event("9", "digit 9"),
        endpoint_event("*", "star"),
        endpoint_event("#", "pound"),
        endpoint_event("A", "digit A"),
        endpoint_event("B", "digit B"),
        endpoint_event("C", "digit C"),
        endpoint_event("D", "digit D"),
        endpoint_event("X", "any digit"),
        endpoint_event("T", "interdigit timer"),
    ],
    signals: &[],
};

static RTP: Package = Package {
    name: "R",
    description: "RTP",
    events: &[
        EventDefinition {
            name: "rto",
            scope: EventScope::Connection,
            description: "RTP timeout",
        },
        EventDefinition {
            name: "iceto",
            scope: EventScope::Connection,
            description: "ICE timeout",
        },
    ],
    signals: &[],
};

static BUILTIN: &[&Package] = &[&ADVANCED_AUDIO, &DTMF, &RTP];

/// Lookup over a fixed set of packages
#[derive(Debug, Clone, Copy)]
pub struct PackageRegistry {
    packages: &'static [&'static Package],
}

impl Default for PackageRegistry {
    fn default() -> Self {
        Self { packages: BUILTIN }
    }
}

impl PackageRegistry {
    /// Registry over the built-in packages
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packages(&self) -> &'static [&'static Package] {
        self.packages
    }

    pub fn package(&self, name: &str) -> Option<&'static Package> {
        self.packages.iter().copied().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Whether `package` defines `event`
    pub fn is_event_supported(&self, package: &str, event: &str) -> bool {
        self.package(package).and_then(|p| p.event(event)).is_some()
    }

    /// Definition of an event
    ///
    /// An event without a package is looked up in every package.
    pub fn event_details(&self, event: &EventName) -> Result<&'static EventDefinition> {
        match &event.package {
            Some(name) => {
                let package = self.package(name).ok_or_else(|| GatewayError::UnsupportedPackage {
                    package: name.clone(),
                })?;
                package.event(&event.name).ok_or_else(|| GatewayError::UnsupportedEvent {
                    event: event.to_string(),
                })
            }
            None => self
                .packages
                .iter()
                .find_map(|p| p.event(&event.name))
                .ok_or_else(|| GatewayError::UnsupportedEvent {
                    event: event.to_string(),
                }),
        }
    }

    pub fn is_signal_supported(&self, signal: &EventName) -> bool {
        self.signal_definition(signal).is_ok()
    }

    fn signal_definition(&self, signal: &EventName) -> Result<&'static SignalDefinition> {
        match &signal.package {
            Some(name) => {
                let package = self.package(name).ok_or_else(|| GatewayError::UnsupportedPackage {
                    package: name.clone(),
                })?;
                package.signal(&signal.name).ok_or_else(|| GatewayError::UnsupportedSignal {
                    signal: signal.to_string(),
                })
            }
            None => self
                .packages
                .iter()
                .find_map(|p| p.signal(&signal.name))
                .ok_or_else(|| GatewayError::UnsupportedSignal {
                    signal: signal.to_string(),
                }),
        }
    }

    /// Constructor for a requested signal
    pub fn signal_constructor(&self, signal: &EventName) -> Result<SignalConstructor> {
        self.signal_definition(signal).map(|d| d.constructor)
    }

    /// Validate a requested signal and build its spec
    pub fn signal_spec(&self, request: &SignalRequest) -> Result<SignalSpec> {
        let constructor = self.signal_constructor(&request.signal)?;
        constructor(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(s: &str) -> SignalRequest {
        s.parse().unwrap()
    }

    #[test]
    fn test_event_lookup() {
        let packages = PackageRegistry::new();
        assert!(packages.is_event_supported("au", "OC"));
        assert!(packages.is_event_supported("D", "#"));
        assert!(!packages.is_event_supported("D", "rto"));

        let rto = packages.event_details(&"R/rto@1F".parse().unwrap()).unwrap();
        assert_eq!(rto.scope, EventScope::Connection);
        let unpackaged = packages.event_details(&"of".parse().unwrap()).unwrap();
        assert_eq!(unpackaged.name, "of");

        assert!(matches!(
            packages.event_details(&"XY/foo".parse().unwrap()),
            Err(GatewayError::UnsupportedPackage { .. })
        ));
        assert!(matches!(
            packages.event_details(&"AU/zz".parse().unwrap()),
            Err(GatewayError::UnsupportedEvent { .. })
        ));
    }

    #[test]
    fn test_signal_specs() {
        let packages = PackageRegistry::new();
        assert_eq!(
            packages.signal_spec(&signal("AU/pa(an=welcome.wav it=2)")).unwrap(),
            SignalSpec::PlayAnnouncement {
                uri: "welcome.wav".to_string(),
                iterations: 2,
            }
        );
        assert_eq!(
            packages.signal_spec(&signal("AU/pc(ip=menu.wav mx=4 fdt=30)")).unwrap(),
            SignalSpec::PlayCollect {
                prompt: Some("menu.wav".to_string()),
                max_digits: 4,
                first_digit_timeout: Duration::from_secs(3),
            }
        );
        assert!(matches!(
            packages.signal_spec(&signal("AU/pr(ri=msg.wav)")).unwrap(),
            SignalSpec::PlayRecord { prompt: None, .. }
        ));
        assert_eq!(packages.signal_spec(&signal("es")).unwrap(), SignalSpec::EndSignal);
    }

    #[test]
    fn test_signal_errors() {
        let packages = PackageRegistry::new();
        assert!(matches!(
            packages.signal_spec(&signal("AU/pa")),
            Err(GatewayError::InvalidParameter { .. })
        ));
        assert!(matches!(
            packages.signal_spec(&signal("AU/pc(mx=many)")),
            Err(GatewayError::InvalidParameter { .. })
        ));
        assert!(matches!(
            packages.signal_spec(&signal("D/5")),
            Err(GatewayError::UnsupportedSignal { .. })
        ));
        assert!(matches!(
            packages.signal_spec(&signal("L/rg")),
            Err(GatewayError::UnsupportedPackage { .. })
        ));
        assert!(!packages.is_signal_supported(&"AU/xx".parse().unwrap()));
    }
}
