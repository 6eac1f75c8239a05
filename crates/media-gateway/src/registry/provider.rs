//! Endpoint providers: per-namespace endpoint factories

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rvoip_mgcp_core::EndpointId;
use tracing::debug;

use crate::config::NamespaceConfig;
use crate::endpoint::{Endpoint, EndpointContext, EndpointKind};

/// Creates the endpoints of one namespace
pub trait EndpointProvider: Send + Sync + fmt::Debug {
    /// Namespace prefix including the trailing `/`
    fn namespace(&self) -> &str;

    fn kind(&self) -> EndpointKind;

    /// Endpoints to create when the provider is installed
    fn preallocate(&self) -> usize {
        0
    }

    /// Create the next endpoint, or `None` when the namespace may not grow
    fn provide(&self, domain: &str) -> Option<Arc<Endpoint>>;

    /// An endpoint created by this provider was unregistered
    fn released(&self, _endpoint: &Endpoint) {}
}

/// Provider driven by a [`NamespaceConfig`]
///
/// Endpoint names are the namespace followed by a number counting up from 1.
pub struct BasicEndpointProvider {
    config: NamespaceConfig,
    context: EndpointContext,
    next_number: AtomicU64,
    live: AtomicUsize,
}

impl BasicEndpointProvider {
    pub fn new(config: NamespaceConfig, context: EndpointContext) -> Self {
        Self {
            config,
            context,
            next_number: AtomicU64::new(1),
            live: AtomicUsize::new(0),
        }
    }

    /// Endpoints created and not yet released
    pub fn live_endpoints(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl EndpointProvider for BasicEndpointProvider {
    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn kind(&self) -> EndpointKind {
        self.config.kind
    }

    fn preallocate(&self) -> usize {
        self.config.preallocate
    }

    fn provide(&self, domain: &str) -> Option<Arc<Endpoint>> {
        let limit = self.config.max_endpoints.unwrap_or(usize::MAX);
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .ok()?;

        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        let id = EndpointId::new(format!("{}{}", self.config.namespace, number), domain);
        debug!("Provider {} created endpoint {}", self.config.namespace, id);
        Some(Endpoint::new(
            id,
            self.config.kind,
            self.config.max_connections,
            self.context.clone(),
        ))
    }

    fn released(&self, _endpoint: &Endpoint) {
        let _ = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

impl fmt::Debug for BasicEndpointProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicEndpointProvider")
            .field("namespace", &self.config.namespace)
            .field("kind", &self.config.kind)
            .field("live", &self.live_endpoints())
            .finish()
    }
}
