//! # RVOIP Media Gateway
//!
//! Control plane of an MGCP media gateway (RFC 3435). A call agent drives the
//! gateway with CRCX/MDCX/DLCX/RQNT/AUCX/AUEP requests; the gateway answers
//! every request exactly once, even under retransmission, and reports detected
//! events back with NTFY.
//!
//! ## Architecture
//!
//! - [`transaction`]: one transaction per request id, retransmission handling
//!   and the completed-response cache
//! - [`command`]: the per-verb commands and the verb dispatch table
//! - [`registry`]: endpoint namespaces, providers and `$`/`*` resolution
//! - [`endpoint`]: endpoint lifecycle, media topology and notification state
//! - [`connection`]: connection state machine (NULL, HALF_OPEN, OPEN, CLOSED)
//! - [`media`], [`pool`]: media capabilities and the pools they are leased from
//! - [`packages`], [`signal`]: event and signal packages, signal execution
//! - [`notify`]: NTFY delivery with retransmission
//! - [`gateway`]: the facade wiring everything to a transport
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_media_gateway::prelude::*;
//!
//! # async fn run() -> rvoip_media_gateway::errors::Result<()> {
//! setup_logging(LoggingConfig::default())?;
//!
//! let config = GatewayConfig::new("0.0.0.0:2427".parse().unwrap());
//! let media = Arc::new(BasicMediaFactory::new(&config.rtp));
//! let (gateway, events) = MediaGateway::bind(config, media).await?;
//! gateway.start(events);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod errors;
pub mod gateway;
pub mod logging;
pub mod media;
pub mod notify;
pub mod packages;
pub mod pool;
pub mod registry;
pub mod signal;
pub mod transaction;

pub use config::GatewayConfig;
pub use errors::{GatewayError, Result};
pub use gateway::MediaGateway;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::command::{CommandContext, CommandProvider, MgcpCommand};
    pub use crate::config::{GatewayConfig, NamespaceConfig, NotificationConfig, PoolConfig, RtpConfig, TimerConfig};
    pub use crate::connection::{CallId, Connection, ConnectionId, ConnectionKind, ConnectionState};
    pub use crate::endpoint::{Endpoint, EndpointKind, EndpointState};
    pub use crate::errors::{GatewayError, Result};
    pub use crate::gateway::MediaGateway;
    pub use crate::logging::{setup_logging, LogFormat, LoggingConfig};
    pub use crate::media::{BasicMediaFactory, MediaResourceFactory};
    pub use crate::packages::PackageRegistry;
    pub use crate::pool::{MediaPools, ResourcePool};
    pub use crate::registry::{BasicEndpointProvider, EndpointProvider, EndpointRegistry};
    pub use crate::transaction::{ExecuteOutcome, TransactionManager};
}
