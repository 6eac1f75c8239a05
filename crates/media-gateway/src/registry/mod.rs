//! # Endpoint Registry
//!
//! Maps endpoint names to live [`Endpoint`]s and resolves the three name
//! patterns a call agent may use:
//!
//! - exact: `ivr/3@gw` names one registered endpoint
//! - any (`$`): `ivr/$@gw` picks the first endpoint of the namespace, in
//!   registration order, that can take another connection; when none can, the
//!   namespace provider is asked for a new one
//! - all (`*`): `ivr/*@gw` yields every endpoint of the namespace
//!
//! Endpoints are created by [`EndpointProvider`]s installed per namespace.
//! Uninstalling a provider stops resolution in its namespace but leaves the
//! endpoints it created reachable through [`EndpointRegistry::get_endpoint`] so
//! calls in progress are not torn down.
//!
//! Lookups compare local names case-insensitively and ignore the domain: the
//! gateway answers for a single domain.
//!
//! The registry also hosts the [`ObserverHub`] through which endpoints see
//! MGCP traffic.

mod observer;
mod provider;

pub use observer::{MessageDirection, MgcpMessageObserver, ObserverHub};
pub use provider::{BasicEndpointProvider, EndpointProvider};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use rvoip_mgcp_core::{EndpointId, Wildcard};
use tracing::{debug, info};

use crate::endpoint::{Endpoint, EndpointState};
use crate::errors::{GatewayError, Result};

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

// Local name of `ivr/1@gw` or `ivr/1`
fn local_part(identifier: &str) -> &str {
    identifier
        .rsplit_once('@')
        .map(|(local, _)| local)
        .unwrap_or(identifier)
}

/// Registry of endpoints and their providers
pub struct EndpointRegistry {
    domain: String,
    providers: DashMap<String, Arc<dyn EndpointProvider>>,
    endpoints: DashMap<String, Arc<Endpoint>>,
    ordered: Mutex<HashMap<String, Vec<Arc<Endpoint>>>>,
    observers: ObserverHub,
}

impl EndpointRegistry {
    /// Registry for endpoints in `domain`
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            providers: DashMap::new(),
            endpoints: DashMap::new(),
            ordered: Mutex::new(HashMap::new()),
            observers: ObserverHub::new(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn observers(&self) -> &ObserverHub {
        &self.observers
    }

    /// Install a provider and create its pre-allocated endpoints
    pub fn install_provider(&self, provider: Arc<dyn EndpointProvider>) -> Result<()> {
        let namespace = normalize(provider.namespace());
        match self.providers.entry(namespace.clone()) {
            Entry::Occupied(_) => {
                return Err(GatewayError::DuplicateNamespace { namespace });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&provider));
            }
        }

        for _ in 0..provider.preallocate() {
            self.register_endpoint(&namespace)?;
        }
        info!(
            "Installed {} provider for {} with {} endpoint(s)",
            provider.kind(),
            namespace,
            provider.preallocate()
        );
        Ok(())
    }

    /// Remove the provider of `namespace`; its endpoints stay registered
    pub fn uninstall_provider(&self, namespace: &str) -> Result<Arc<dyn EndpointProvider>> {
        let namespace = normalize(namespace);
        let (_, provider) = self
            .providers
            .remove(&namespace)
            .ok_or_else(|| GatewayError::UnrecognizedNamespace {
                namespace: namespace.clone(),
            })?;
        info!("Uninstalled provider for {}", namespace);
        Ok(provider)
    }

    pub fn is_installed(&self, namespace: &str) -> bool {
        self.providers.contains_key(&normalize(namespace))
    }

    /// Installed namespaces, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        namespaces.sort();
        namespaces
    }

    fn provider(&self, namespace: &str) -> Result<Arc<dyn EndpointProvider>> {
        self.providers
            .get(&normalize(namespace))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| GatewayError::UnrecognizedNamespace {
                namespace: namespace.to_string(),
            })
    }

    /// Ask the namespace provider for a new endpoint and register it
    pub fn register_endpoint(&self, namespace: &str) -> Result<Arc<Endpoint>> {
        let provider = self.provider(namespace)?;
        let endpoint = provider
            .provide(&self.domain)
            .ok_or_else(|| GatewayError::NoEndpointAvailable {
                namespace: namespace.to_string(),
            })?;

        let key = normalize(endpoint.id().local_name());
        self.endpoints.insert(key, Arc::clone(&endpoint));
        self.ordered
            .lock()
            .entry(normalize(endpoint.id().namespace()))
            .or_default()
            .push(Arc::clone(&endpoint));
        self.observers.add(endpoint.clone());

        debug!("Registered endpoint {}", endpoint.id());
        Ok(endpoint)
    }

    /// Direct lookup by `local@domain` or local name
    pub fn get_endpoint(&self, identifier: &str) -> Option<Arc<Endpoint>> {
        self.endpoints
            .get(&normalize(local_part(identifier)))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove an endpoint; removing an unknown endpoint does nothing
    pub fn unregister_endpoint(&self, identifier: &str) -> Option<Arc<Endpoint>> {
        let (_, endpoint) = self.endpoints.remove(&normalize(local_part(identifier)))?;

        if let Some(list) = self.ordered.lock().get_mut(&normalize(endpoint.id().namespace())) {
            list.retain(|e| !Arc::ptr_eq(e, &endpoint));
        }
        let observer: Arc<dyn MgcpMessageObserver> = endpoint.clone();
        self.observers.remove(&observer);
        if let Ok(provider) = self.provider(endpoint.id().namespace()) {
            provider.released(&endpoint);
        }

        debug!("Unregistered endpoint {}", endpoint.id());
        Some(endpoint)
    }

    /// Resolve an endpoint name, possibly wildcarded
    ///
    /// `$` and `*` need the namespace's provider. An exact name reaches any
    /// registered endpoint, including one whose provider was uninstalled, so
    /// calls already set up on it can still be modified and torn down.
    pub fn resolve(&self, id: &EndpointId) -> Result<Vec<Arc<Endpoint>>> {
        let namespace = id.namespace();
        if namespace.contains(['$', '*']) {
            return Err(GatewayError::WildcardTooComplicated {
                endpoint: id.to_string(),
            });
        }

        match id.wildcard() {
            Some(Wildcard::All) => {
                self.provider(namespace)?;
                Ok(self.namespace_endpoints(namespace))
            }
            Some(Wildcard::Any) => {
                self.provider(namespace)?;
                self.resolve_any(namespace, None).map(|endpoint| vec![endpoint])
            }
            None => self.resolve_exact(id).map(|endpoint| vec![endpoint]),
        }
    }

    fn resolve_exact(&self, id: &EndpointId) -> Result<Arc<Endpoint>> {
        let Some(endpoint) = self.get_endpoint(id.local_name()) else {
            self.provider(id.namespace())?;
            return Err(GatewayError::UnrecognizedEndpoint {
                endpoint: id.to_string(),
            });
        };
        if endpoint.state() != EndpointState::Active {
            return Err(GatewayError::EndpointNotReady {
                endpoint: id.to_string(),
            });
        }
        Ok(endpoint)
    }

    /// Resolve a name that must denote exactly one endpoint (`*` is rejected)
    pub fn resolve_one(&self, id: &EndpointId) -> Result<Arc<Endpoint>> {
        if id.wildcard() == Some(Wildcard::All) {
            return Err(GatewayError::WildcardTooComplicated {
                endpoint: id.to_string(),
            });
        }
        self.resolve(id)?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::UnrecognizedEndpoint {
                endpoint: id.to_string(),
            })
    }

    /// Like [`resolve_one`](Self::resolve_one), but never yields `other`
    ///
    /// `$` skips `other` and may grow the namespace; an exact name denoting
    /// `other` is an invalid parameter.
    pub fn resolve_one_except(&self, id: &EndpointId, other: &Arc<Endpoint>) -> Result<Arc<Endpoint>> {
        if id.wildcard() == Some(Wildcard::Any) && !id.namespace().contains(['$', '*']) {
            self.provider(id.namespace())?;
            return self.resolve_any(id.namespace(), Some(other));
        }
        let endpoint = self.resolve_one(id)?;
        if Arc::ptr_eq(&endpoint, other) {
            return Err(GatewayError::invalid_parameter(
                "Z2",
                format!("{} is already the first endpoint", endpoint.id()),
            ));
        }
        Ok(endpoint)
    }

    fn resolve_any(&self, namespace: &str, except: Option<&Arc<Endpoint>>) -> Result<Arc<Endpoint>> {
        let free = self.ordered.lock().get(&normalize(namespace)).and_then(|list| {
            list.iter()
                .find(|e| e.is_free() && !except.is_some_and(|other| Arc::ptr_eq(*e, other)))
                .cloned()
        });
        match free {
            Some(endpoint) => Ok(endpoint),
            None => self.register_endpoint(namespace),
        }
    }

    /// Endpoints of a namespace in registration order
    pub fn namespace_endpoints(&self, namespace: &str) -> Vec<Arc<Endpoint>> {
        self.ordered
            .lock()
            .get(&normalize(namespace))
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of all registered endpoints, sorted by name
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        let mut endpoints: Vec<Arc<Endpoint>> = self.endpoints.iter().map(|e| Arc::clone(e.value())).collect();
        endpoints.sort_by(|a, b| a.id().local_name().cmp(b.id().local_name()));
        endpoints
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Close every endpoint, waiting for all of their connections
    pub async fn close_all(&self) {
        let endpoints = self.endpoints();
        join_all(endpoints.iter().map(|endpoint| endpoint.close())).await;
        info!("Closed {} endpoint(s)", endpoints.len());
    }
}

impl fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("domain", &self.domain)
            .field("namespaces", &self.namespaces())
            .field("endpoints", &self.endpoint_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NamespaceConfig, PoolConfig, RtpConfig};
    use crate::connection::{CallId, ConnectionKind, ConnectionTimeouts};
    use crate::endpoint::{EndpointContext, EndpointKind};
    use crate::media::BasicMediaFactory;
    use crate::pool::MediaPools;

    fn context() -> EndpointContext {
        let factory = Arc::new(BasicMediaFactory::new(&RtpConfig::default()));
        EndpointContext::new(
            MediaPools::new(&PoolConfig::default(), factory),
            ConnectionTimeouts::default(),
        )
    }

    fn provider(config: NamespaceConfig) -> Arc<dyn EndpointProvider> {
        Arc::new(BasicEndpointProvider::new(config, context()))
    }

    fn id(s: &str) -> EndpointId {
        s.parse().unwrap()
    }

    #[test]
    fn test_preallocation_and_lookup() {
        let registry = EndpointRegistry::new("gw");
        registry
            .install_provider(provider(
                NamespaceConfig::new("ivr/", EndpointKind::Ivr).with_preallocate(3),
            ))
            .unwrap();

        assert_eq!(registry.endpoint_count(), 3);
        assert!(registry.get_endpoint("ivr/2@gw").is_some());
        assert!(registry.get_endpoint("IVR/2").is_some());
        assert_eq!(registry.observers().len(), 3);
        assert_eq!(registry.resolve_one(&id("ivr/3@other")).unwrap().id().local_name(), "ivr/3");
    }

    #[test]
    fn test_unknown_names() {
        let registry = EndpointRegistry::new("gw");
        registry
            .install_provider(provider(NamespaceConfig::new("ivr/", EndpointKind::Ivr)))
            .unwrap();

        assert!(matches!(
            registry.resolve(&id("ivr/9@gw")),
            Err(GatewayError::UnrecognizedEndpoint { .. })
        ));
        assert!(matches!(
            registry.resolve(&id("cnf/1@gw")),
            Err(GatewayError::UnrecognizedNamespace { .. })
        ));
        assert!(matches!(
            registry.resolve(&id("ivr/$/1@gw")),
            Err(GatewayError::WildcardTooComplicated { .. })
        ));
        assert!(matches!(
            registry.resolve_one(&id("ivr/*@gw")),
            Err(GatewayError::WildcardTooComplicated { .. })
        ));
    }

    #[tokio::test]
    async fn test_any_grows_until_limit() {
        let registry = EndpointRegistry::new("gw");
        registry
            .install_provider(provider(
                NamespaceConfig::new("ivr/", EndpointKind::Ivr)
                    .with_max_connections(1)
                    .with_max_endpoints(2),
            ))
            .unwrap();
        assert_eq!(registry.endpoint_count(), 0);

        for expected in ["ivr/1", "ivr/2"] {
            let endpoint = registry.resolve_one(&id("ivr/$@gw")).unwrap();
            assert_eq!(endpoint.id().local_name(), expected);
            endpoint
                .create_connection(CallId::new("C"), ConnectionKind::Remote)
                .unwrap();
        }
        assert!(matches!(
            registry.resolve_one(&id("ivr/$@gw")),
            Err(GatewayError::NoEndpointAvailable { .. })
        ));
    }

    #[test]
    fn test_unregister_is_idempotent_and_frees_provider_slot() {
        let registry = EndpointRegistry::new("gw");
        registry
            .install_provider(provider(
                NamespaceConfig::new("ivr/", EndpointKind::Ivr)
                    .with_preallocate(1)
                    .with_max_endpoints(1),
            ))
            .unwrap();

        assert!(registry.unregister_endpoint("ivr/1@gw").is_some());
        assert!(registry.unregister_endpoint("ivr/1@gw").is_none());
        assert!(registry.observers().is_empty());
        assert_eq!(registry.register_endpoint("ivr/").unwrap().id().local_name(), "ivr/2");
    }
}
