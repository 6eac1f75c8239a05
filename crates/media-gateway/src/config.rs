//! # Media Gateway Configuration
//!
//! [`GatewayConfig`] collects everything needed to wire a gateway: where it
//! listens, which endpoint namespaces it serves, how large the media resource
//! pools are and how the protocol timers behave.
//!
//! Every section has a sensible [`Default`], so a config can be built
//! incrementally:
//!
//! ```rust
//! use std::time::Duration;
//! use rvoip_media_gateway::config::{GatewayConfig, NamespaceConfig};
//! use rvoip_media_gateway::endpoint::EndpointKind;
//!
//! let config = GatewayConfig::new("127.0.0.1:2427".parse().unwrap())
//!     .with_domain("mgw.example.net")
//!     .with_namespace(NamespaceConfig::new("aap/", EndpointKind::Ivr).with_preallocate(3))
//!     .with_half_open_timeout(Duration::from_secs(10));
//! assert!(config.validate().is_ok());
//! ```
//!
//! or loaded from JSON, where missing fields take their defaults:
//!
//! ```rust
//! use rvoip_media_gateway::config::GatewayConfig;
//!
//! let config = GatewayConfig::from_json_str(r#"{ "domain": "mgw.example.net" }"#).unwrap();
//! assert_eq!(config.domain, "mgw.example.net");
//! ```

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use rvoip_mgcp_transport::DEFAULT_GATEWAY_PORT;
use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointKind;
use crate::errors::{GatewayError, Result};

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the MGCP transport binds to
    pub bind_address: SocketAddr,
    /// Domain part of every endpoint identifier the gateway owns
    pub domain: String,
    /// Endpoint namespaces served by the gateway
    pub namespaces: Vec<NamespaceConfig>,
    /// Media resource pool sizes
    pub pools: PoolConfig,
    /// Built-in RTP channel settings
    pub rtp: RtpConfig,
    /// Protocol timers
    pub timers: TimerConfig,
    /// NTFY delivery policy
    pub notification: NotificationConfig,
    /// Notified entity used when neither RQNT nor CRCX supplied one
    pub default_notified_entity: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let bind_address = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_GATEWAY_PORT);
        Self {
            bind_address,
            domain: format!("127.0.0.1:{}", DEFAULT_GATEWAY_PORT),
            namespaces: vec![
                NamespaceConfig::new("bridge/", EndpointKind::Bridge).with_preallocate(4),
                NamespaceConfig::new("ivr/", EndpointKind::Ivr).with_preallocate(4),
                NamespaceConfig::new("cnf/", EndpointKind::Conference)
                    .with_max_connections(10)
                    .with_preallocate(2),
            ],
            pools: PoolConfig::default(),
            rtp: RtpConfig::default(),
            timers: TimerConfig::default(),
            notification: NotificationConfig::default(),
            default_notified_entity: None,
        }
    }
}

impl GatewayConfig {
    /// Default configuration listening on `bind_address`
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            domain: bind_address.to_string(),
            ..Default::default()
        }
    }

    /// Load a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: GatewayConfig = serde_json::from_str(json)
            .map_err(|e| GatewayError::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the endpoint domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Add a namespace, replacing one with the same prefix
    pub fn with_namespace(mut self, namespace: NamespaceConfig) -> Self {
        self.namespaces
            .retain(|ns| !ns.namespace.eq_ignore_ascii_case(&namespace.namespace));
        self.namespaces.push(namespace);
        self
    }

    /// Replace all namespaces
    pub fn with_namespaces(mut self, namespaces: Vec<NamespaceConfig>) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Set the pool sizes
    pub fn with_pools(mut self, pools: PoolConfig) -> Self {
        self.pools = pools;
        self
    }

    /// Set the RTP port range of the built-in channel
    pub fn with_rtp_ports(mut self, min: u16, max: u16) -> Self {
        self.rtp.port_min = min;
        self.rtp.port_max = max;
        self
    }

    /// Set how long a connection may stay half-open
    pub fn with_half_open_timeout(mut self, timeout: Duration) -> Self {
        self.timers.half_open_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the maximum connection lifetime (`None` for unlimited)
    pub fn with_connection_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timers.connection_timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        self
    }

    /// Set how long completed responses are kept for retransmissions
    pub fn with_response_retention(mut self, retention: Duration) -> Self {
        self.timers.response_retention_ms = retention.as_millis() as u64;
        self
    }

    /// Set the notified entity used by default
    pub fn with_default_notified_entity(mut self, entity: impl Into<String>) -> Self {
        self.default_notified_entity = Some(entity.into());
        self
    }

    /// Check the configuration for inconsistencies
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(GatewayError::config("domain must not be empty"));
        }
        if self.rtp.port_min == 0 || self.rtp.port_min > self.rtp.port_max {
            return Err(GatewayError::config(format!(
                "invalid RTP port range {}-{}",
                self.rtp.port_min, self.rtp.port_max
            )));
        }

        let mut seen = HashSet::new();
        for ns in &self.namespaces {
            ns.validate()?;
            if !seen.insert(ns.namespace.to_ascii_lowercase()) {
                return Err(GatewayError::config(format!("namespace {} configured twice", ns.namespace)));
            }
        }

        if self.notification.max_attempts == 0 {
            return Err(GatewayError::config("notification.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// One endpoint namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Prefix including the trailing `/`, e.g. `ivr/`
    pub namespace: String,
    /// Media behaviour of the endpoints
    pub kind: EndpointKind,
    /// Connections each endpoint accepts
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Endpoints created when the namespace is installed
    #[serde(default)]
    pub preallocate: usize,
    /// Upper bound on endpoints in the namespace (`None` for unbounded)
    #[serde(default)]
    pub max_endpoints: Option<usize>,
}

fn default_max_connections() -> usize {
    2
}

impl NamespaceConfig {
    /// Namespace with two connections per endpoint and no pre-allocation
    pub fn new(namespace: impl Into<String>, kind: EndpointKind) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            max_connections: default_max_connections(),
            preallocate: 0,
            max_endpoints: None,
        }
    }

    /// Set the per-endpoint connection capacity
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the number of endpoints created at install time
    pub fn with_preallocate(mut self, count: usize) -> Self {
        self.preallocate = count;
        self
    }

    /// Bound the number of endpoints
    pub fn with_max_endpoints(mut self, max: usize) -> Self {
        self.max_endpoints = Some(max);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || !self.namespace.ends_with('/') {
            return Err(GatewayError::config(format!(
                "namespace '{}' must end with '/'",
                self.namespace
            )));
        }
        if self.max_connections == 0 {
            return Err(GatewayError::config(format!(
                "namespace {} must allow at least one connection",
                self.namespace
            )));
        }
        if let Some(max) = self.max_endpoints {
            if self.preallocate > max {
                return Err(GatewayError::config(format!(
                    "namespace {} preallocates {} endpoints but allows only {}",
                    self.namespace, self.preallocate, max
                )));
            }
        }
        Ok(())
    }
}

/// Sizes of the gateway-wide media resource pools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub rtp_channels: usize,
    pub players: usize,
    pub recorders: usize,
    pub dtmf_detectors: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            rtp_channels: 128,
            players: 32,
            recorders: 16,
            dtmf_detectors: 32,
        }
    }
}

/// Settings for the built-in RTP channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpConfig {
    /// Address advertised in generated SDP
    pub local_address: IpAddr,
    /// Lowest RTP port handed out
    pub port_min: u16,
    /// Highest RTP port handed out
    pub port_max: u16,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            local_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port_min: 10000,
            port_max: 20000,
        }
    }
}

/// Protocol timers, in milliseconds so they read naturally in JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// How long a connection may stay half-open before it is closed
    pub half_open_timeout_ms: u64,
    /// Maximum connection lifetime from OPEN, 0 for unlimited
    pub connection_timeout_ms: u64,
    /// How long a completed response is kept for retransmitted requests
    pub response_retention_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            half_open_timeout_ms: 30_000,
            connection_timeout_ms: 0,
            response_retention_ms: 30_000,
        }
    }
}

impl TimerConfig {
    /// Half-open timeout
    pub fn half_open_timeout(&self) -> Duration {
        Duration::from_millis(self.half_open_timeout_ms)
    }

    /// Connection lifetime, if bounded
    pub fn connection_timeout(&self) -> Option<Duration> {
        match self.connection_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Completed response retention
    pub fn response_retention(&self) -> Duration {
        Duration::from_millis(self.response_retention_ms)
    }
}

/// NTFY retransmission policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// First retransmission delay
    pub initial_retransmit_ms: u64,
    /// Cap for the doubling delay
    pub max_retransmit_ms: u64,
    /// Transmissions before giving up
    pub max_attempts: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            initial_retransmit_ms: 200,
            max_retransmit_ms: 4_000,
            max_attempts: 7,
        }
    }
}

impl NotificationConfig {
    /// Delay before retransmission number `attempt` (starting at 0)
    pub fn retransmit_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self.initial_retransmit_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.max_retransmit_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address.port(), 2427);
        assert_eq!(config.namespaces.len(), 3);
    }

    #[test]
    fn test_json_loading_with_defaults() {
        let json = r#"{
            "domain": "mgw.example.net",
            "namespaces": [
                { "namespace": "aap/", "kind": "ivr", "preallocate": 3 }
            ],
            "timers": { "half_open_timeout_ms": 5000 }
        }"#;
        let config = GatewayConfig::from_json_str(json).unwrap();
        assert_eq!(config.domain, "mgw.example.net");
        assert_eq!(config.namespaces[0].kind, EndpointKind::Ivr);
        assert_eq!(config.namespaces[0].max_connections, 2);
        assert_eq!(config.timers.half_open_timeout(), Duration::from_secs(5));
        assert_eq!(config.timers.response_retention(), Duration::from_secs(30));
        assert_eq!(config.pools.players, 32);
    }

    #[test]
    fn test_validation_failures() {
        let bad_ns = GatewayConfig::default().with_namespace(NamespaceConfig::new("ivr", EndpointKind::Ivr));
        assert!(bad_ns.validate().is_err());

        let duplicate = GatewayConfig::default().with_namespaces(vec![
            NamespaceConfig::new("ivr/", EndpointKind::Ivr),
            NamespaceConfig::new("IVR/", EndpointKind::Ivr),
        ]);
        assert!(duplicate.validate().is_err());

        let ports = GatewayConfig::default().with_rtp_ports(3000, 2000);
        assert!(ports.validate().is_err());

        assert!(GatewayConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_retransmit_backoff() {
        let policy = NotificationConfig::default();
        assert_eq!(policy.retransmit_delay(0), Duration::from_millis(200));
        assert_eq!(policy.retransmit_delay(1), Duration::from_millis(400));
        assert_eq!(policy.retransmit_delay(4), Duration::from_millis(3200));
        assert_eq!(policy.retransmit_delay(5), Duration::from_millis(4000));
        assert_eq!(policy.retransmit_delay(80), Duration::from_millis(4000));
    }
}
