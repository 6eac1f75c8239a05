//! # Media Gateway
//!
//! [`MediaGateway`] wires the control plane together: the endpoint registry
//! with one provider per configured namespace, the media resource pools, the
//! package registry, the transaction manager and the NTFY dispatcher.
//!
//! Inbound messages flow through [`MediaGateway::handle_message`]:
//!
//! ```text
//! transport ─▶ observers ─▶ request ─▶ TransactionManager ─▶ command ─▶ response ─▶ transport
//!                       └─▶ response ─▶ NotificationDispatcher (pending NTFY)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_media_gateway::config::GatewayConfig;
//! use rvoip_media_gateway::gateway::MediaGateway;
//! use rvoip_media_gateway::media::BasicMediaFactory;
//!
//! # async fn run() -> rvoip_media_gateway::errors::Result<()> {
//! let config = GatewayConfig::new("0.0.0.0:2427".parse().unwrap()).with_domain("mgw.example.net");
//! let media = Arc::new(BasicMediaFactory::new(&config.rtp));
//! let (gateway, events) = MediaGateway::bind(config, media).await?;
//! gateway.start(events);
//! tokio::signal::ctrl_c().await.ok();
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rvoip_mgcp_core::MgcpMessage;
use rvoip_mgcp_transport::{Transport, TransportEvent, UdpTransport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::CommandContext;
use crate::config::GatewayConfig;
use crate::connection::ConnectionTimeouts;
use crate::endpoint::EndpointContext;
use crate::errors::Result;
use crate::media::MediaResourceFactory;
use crate::notify::NotificationDispatcher;
use crate::packages::PackageRegistry;
use crate::pool::MediaPools;
use crate::registry::{BasicEndpointProvider, EndpointRegistry, MessageDirection};
use crate::signal::SignalExecutor;
use crate::transaction::TransactionManager;

struct GatewayInner {
    config: GatewayConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<EndpointRegistry>,
    pools: MediaPools,
    transactions: TransactionManager,
    dispatcher: NotificationDispatcher,
    event_task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

/// An MGCP media gateway
#[derive(Clone)]
pub struct MediaGateway {
    inner: Arc<GatewayInner>,
}

impl MediaGateway {
    /// Build a gateway on an existing transport
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn Transport>,
        media: Arc<dyn MediaResourceFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let pools = MediaPools::new(&config.pools, media);
        let dispatcher = NotificationDispatcher::new(Arc::clone(&transport), config.notification.clone());
        let timeouts = ConnectionTimeouts {
            half_open: config.timers.half_open_timeout(),
            lifetime: config.timers.connection_timeout(),
        };
        let endpoint_context = EndpointContext::new(pools.clone(), timeouts)
            .with_notifier(Arc::new(dispatcher.clone()))
            .with_default_notified_entity(config.default_notified_entity.clone());

        let registry = Arc::new(EndpointRegistry::new(config.domain.clone()));
        for namespace in &config.namespaces {
            registry.install_provider(Arc::new(BasicEndpointProvider::new(
                namespace.clone(),
                endpoint_context.clone(),
            )))?;
        }

        let packages = PackageRegistry::new();
        let signals = SignalExecutor::new(packages, pools.clone());
        let context = Arc::new(CommandContext::new(Arc::clone(&registry), packages, signals));
        let transactions =
            TransactionManager::new(Arc::clone(&transport), context, config.timers.response_retention());

        info!(
            "Media gateway for {} with {} namespace(s), {} endpoint(s)",
            config.domain,
            config.namespaces.len(),
            registry.endpoint_count()
        );

        Ok(Self {
            inner: Arc::new(GatewayInner {
                config,
                transport,
                registry,
                pools,
                transactions,
                dispatcher,
                event_task: Mutex::new(None),
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Bind a UDP transport on the configured address and build the gateway
    pub async fn bind(
        config: GatewayConfig,
        media: Arc<dyn MediaResourceFactory>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let (transport, events) = UdpTransport::bind(config.bind_address, None).await?;
        let gateway = Self::new(config, Arc::new(transport), media)?;
        Ok((gateway, events))
    }

    /// Start consuming transport events
    pub fn start(&self, mut events: mpsc::Receiver<TransportEvent>) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Media gateway already started");
            return;
        }
        self.inner.transactions.start();

        let weak: Weak<GatewayInner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let gateway = MediaGateway { inner };
                match event {
                    TransportEvent::MessageReceived { message, source, .. } => {
                        gateway.handle_message(message, source).await;
                    }
                    TransportEvent::Error { error } => {
                        warn!("Transport error: {}", error);
                    }
                    TransportEvent::Closed => {
                        debug!("Transport closed");
                        break;
                    }
                }
            }
            debug!("Media gateway event loop ended");
        });
        *self.inner.event_task.lock() = Some(task);

        match self.inner.transport.local_addr() {
            Ok(addr) => info!("Media gateway listening on {}", addr),
            Err(e) => warn!("Media gateway started without a local address: {}", e),
        }
    }

    /// Process one inbound message
    pub async fn handle_message(&self, message: MgcpMessage, source: SocketAddr) {
        self.inner
            .registry
            .observers()
            .notify(&message, MessageDirection::Incoming, source);

        match message {
            MgcpMessage::Request(request) => {
                debug!(
                    "{} {} {} from {}",
                    request.verb, request.transaction_id, request.endpoint, source
                );
                self.inner.transactions.execute(request, source).await;
            }
            MgcpMessage::Response(response) => {
                debug!("Response {} {} from {}", response.code, response.transaction_id, source);
                self.inner.dispatcher.on_response(response);
            }
        }
    }

    /// Stop the event loop, close every endpoint and the transport
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("Media gateway shutting down without having been started");
        }
        if let Some(task) = self.inner.event_task.lock().take() {
            task.abort();
        }
        self.inner.transactions.shutdown();
        self.inner.registry.close_all().await;
        if let Err(e) = self.inner.transport.close().await {
            warn!("Failed to close transport: {}", e);
        }
        info!("Media gateway stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.inner.registry
    }

    pub fn pools(&self) -> &MediaPools {
        &self.inner.pools
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.inner.transactions
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.inner.dispatcher
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.transport.local_addr()?)
    }
}

impl fmt::Debug for MediaGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaGateway")
            .field("domain", &self.inner.config.domain)
            .field("running", &self.is_running())
            .field("endpoints", &self.inner.registry.endpoint_count())
            .field("transactions", &self.inner.transactions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rvoip_mgcp_core::builder::RequestBuilder;
    use rvoip_mgcp_core::{ConnectionMode, MgcpResponse, ParameterName, ReturnCode, TransactionId, Verb};

    use crate::config::NamespaceConfig;
    use crate::endpoint::EndpointKind;
    use crate::media::BasicMediaFactory;
    use crate::test_support::{wait_for_sent, RecordingTransport};

    fn gateway(transport: Arc<RecordingTransport>) -> MediaGateway {
        let config = GatewayConfig::new("127.0.0.1:2427".parse().unwrap())
            .with_domain("mgw")
            .with_namespaces(vec![NamespaceConfig::new("ivr/", EndpointKind::Ivr).with_preallocate(1)])
            .with_default_notified_entity("ca@127.0.0.1:2727");
        let media = Arc::new(
            BasicMediaFactory::new(&config.rtp).with_play_duration(Duration::from_millis(20)),
        );
        MediaGateway::new(config, transport, media).unwrap()
    }

    fn call_agent() -> SocketAddr {
        "127.0.0.1:2727".parse().unwrap()
    }

    fn responses(transport: &RecordingTransport) -> Vec<MgcpResponse> {
        transport
            .sent()
            .into_iter()
            .filter_map(|(message, _)| match message {
                MgcpMessage::Response(response) => Some(response),
                MgcpMessage::Request(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_configured_namespaces_are_installed() {
        let gateway = gateway(Arc::new(RecordingTransport::new()));
        assert!(gateway.registry().is_installed("ivr/"));
        assert_eq!(gateway.registry().endpoint_count(), 1);
        assert!(gateway.registry().get_endpoint("ivr/1").is_some());
    }

    #[tokio::test]
    async fn test_announcement_completion_is_notified() {
        let transport = Arc::new(RecordingTransport::new());
        let gateway = gateway(transport.clone());

        let rqnt = RequestBuilder::new(Verb::Rqnt, TransactionId(300), "ivr/1@mgw".parse().unwrap())
            .request_id("77")
            .parameter(ParameterName::RequestedEvents, "AU/oc(N),AU/of(N)")
            .parameter(ParameterName::SignalRequests, "AU/pa(an=welcome.wav)")
            .build();
        gateway.handle_message(rqnt.into(), call_agent()).await;

        wait_for_sent(&transport, 2).await;
        let sent = transport.sent();
        assert_eq!(responses(&transport)[0].code, ReturnCode::TransactionExecuted);

        let ntfy = sent
            .iter()
            .find_map(|(message, destination)| match message {
                MgcpMessage::Request(request) => Some((request.clone(), *destination)),
                MgcpMessage::Response(_) => None,
            })
            .unwrap();
        assert_eq!(ntfy.0.verb, Verb::Ntfy);
        assert_eq!(ntfy.0.parameter(&ParameterName::RequestIdentifier), Some("77"));
        assert_eq!(ntfy.0.parameter(&ParameterName::ObservedEvents), Some("AU/oc(rc=100)"));
        assert_eq!(ntfy.1, call_agent());

        // The call agent's answer completes the NTFY
        let answer = MgcpResponse::new(ReturnCode::TransactionExecuted, ntfy.0.transaction_id);
        gateway.handle_message(answer.into(), call_agent()).await;
        assert_eq!(gateway.dispatcher().pending(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_endpoints_and_transport() {
        let transport = Arc::new(RecordingTransport::new());
        let gateway = gateway(transport.clone());
        let (_tx, rx) = mpsc::channel(8);
        gateway.start(rx);
        assert!(gateway.is_running());

        let crcx = RequestBuilder::new(Verb::Crcx, TransactionId(301), "ivr/$@mgw".parse().unwrap())
            .call_id("A1")
            .mode(ConnectionMode::SendRecv)
            .build();
        gateway.handle_message(crcx.into(), call_agent()).await;
        wait_for_sent(&transport, 1).await;

        gateway.shutdown().await;
        assert!(!gateway.is_running());
        assert!(transport.is_closed());
        assert_eq!(gateway.pools().rtp_channels.in_use(), 0);
    }
}
