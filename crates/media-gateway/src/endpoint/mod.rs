//! # Endpoint State Machine
//!
//! An [`Endpoint`] is an addressable media termination (`ivr/1@gw`) hosting a
//! bounded set of [`Connection`]s. It is either ACTIVE or CLOSED; closing an
//! endpoint first closes every connection it owns and waits for all of them.
//!
//! The endpoint kind decides how connection media is combined through its
//! [`MediaTopology`]: bridge endpoints split between network and local legs,
//! IVR and conference endpoints mix. Routes are recomputed whenever a
//! connection is added, removed or changes mode.
//!
//! Endpoints also own the notification state driven by RQNT: the current
//! request identifier, the notified entity, requested events and the signals
//! running on behalf of the request.

mod notification;
mod topology;

pub use notification::{
    Notification, NotificationRequest, NotificationSink, NotificationSnapshot, NotificationTarget,
};
pub use topology::{ConnectionView, MediaRoute, MediaTopology};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use rvoip_mgcp_core::{ConnectionMode, EndpointId, MgcpMessage, ObservedEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::connection::{
    CallId, ChannelHandle, Connection, ConnectionId, ConnectionKind, ConnectionListener, ConnectionTimeouts,
};
use crate::errors::{GatewayError, Result};
use crate::media::MediaEvent;
use crate::pool::MediaPools;
use crate::registry::{MessageDirection, MgcpMessageObserver};
use crate::signal::PreparedSignals;

use notification::{EventOutcome, NotificationState};

/// Kind of endpoint a namespace hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Bridges network connections to local connections
    Bridge,
    /// Interactive voice response: announcements, digit collection, recording
    Ivr,
    /// Conference mixer
    Conference,
}

impl EndpointKind {
    pub fn topology(&self) -> MediaTopology {
        match self {
            EndpointKind::Bridge => MediaTopology::Splitter,
            EndpointKind::Ivr | EndpointKind::Conference => MediaTopology::Mixer,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Bridge => write!(f, "bridge"),
            EndpointKind::Ivr => write!(f, "ivr"),
            EndpointKind::Conference => write!(f, "conference"),
        }
    }
}

/// Endpoint lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointState {
    Active,
    /// Close requested, connections still closing
    Closing,
    Closed,
}

/// Gateway services shared by all endpoints
#[derive(Clone)]
pub struct EndpointContext {
    pub pools: MediaPools,
    pub timeouts: ConnectionTimeouts,
    pub notifier: Option<Arc<dyn NotificationSink>>,
    pub default_notified_entity: Option<String>,
}

impl EndpointContext {
    pub fn new(pools: MediaPools, timeouts: ConnectionTimeouts) -> Self {
        Self {
            pools,
            timeouts,
            notifier: None,
            default_notified_entity: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_default_notified_entity(mut self, entity: Option<String>) -> Self {
        self.default_notified_entity = entity;
        self
    }
}

impl fmt::Debug for EndpointContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointContext")
            .field("pools", &self.pools)
            .field("timeouts", &self.timeouts)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

/// A media endpoint
pub struct Endpoint {
    id: EndpointId,
    kind: EndpointKind,
    max_connections: usize,
    context: EndpointContext,
    state: Mutex<EndpointState>,
    state_tx: watch::Sender<EndpointState>,
    reserved: AtomicUsize,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    routes: Mutex<Vec<MediaRoute>>,
    notification: Mutex<NotificationState>,
    signal_task: Mutex<Option<(u64, JoinHandle<()>)>>,
    signal_generation: AtomicU64,
    self_ref: Weak<Endpoint>,
}

impl Endpoint {
    pub fn new(id: EndpointId, kind: EndpointKind, max_connections: usize, context: EndpointContext) -> Arc<Self> {
        let (state_tx, _) = watch::channel(EndpointState::Active);
        Arc::new_cyclic(|self_ref| Endpoint {
            id,
            kind,
            max_connections,
            context,
            state: Mutex::new(EndpointState::Active),
            state_tx,
            reserved: AtomicUsize::new(0),
            connections: DashMap::new(),
            routes: Mutex::new(Vec::new()),
            notification: Mutex::new(NotificationState::default()),
            signal_task: Mutex::new(None),
            signal_generation: AtomicU64::new(0),
            self_ref: self_ref.clone(),
        })
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn state(&self) -> EndpointState {
        *self.state.lock()
    }

    pub fn subscribe(&self) -> watch::Receiver<EndpointState> {
        self.state_tx.subscribe()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Connections currently counted against the capacity
    pub fn connection_count(&self) -> usize {
        self.reserved.load(Ordering::SeqCst)
    }

    /// Whether a `$` lookup may pick this endpoint
    pub fn is_free(&self) -> bool {
        self.state() == EndpointState::Active && self.connection_count() < self.max_connections
    }

    pub fn pools(&self) -> &MediaPools {
        &self.context.pools
    }

    /// Create a connection for `call_id`
    ///
    /// Fails with [`GatewayError::TooManyConnections`] once the endpoint is at
    /// capacity and with [`GatewayError::MediaResourceUnavailable`] when no
    /// RTP channel is left for a remote connection.
    pub fn create_connection(&self, call_id: CallId, kind: ConnectionKind) -> Result<Arc<Connection>> {
        let state = self.state.lock();
        if *state != EndpointState::Active {
            return Err(GatewayError::EndpointNotReady {
                endpoint: self.id.to_string(),
            });
        }

        self.reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_connections).then_some(n + 1)
            })
            .map_err(|_| GatewayError::TooManyConnections {
                endpoint: self.id.to_string(),
                max: self.max_connections,
            })?;

        let listener: Weak<dyn ConnectionListener> = self.self_ref.clone();
        let connection = match kind {
            ConnectionKind::Remote => {
                let pool = &self.context.pools.rtp_channels;
                let Some(channel) = pool.acquire() else {
                    self.reserved.fetch_sub(1, Ordering::SeqCst);
                    return Err(GatewayError::resource_unavailable("rtp channel"));
                };
                Connection::remote(
                    call_id,
                    self.id.clone(),
                    ChannelHandle::new(channel, Arc::clone(pool)),
                    self.context.timeouts,
                    Some(listener),
                )
            }
            ConnectionKind::Local => Connection::local(call_id, self.id.clone(), self.context.timeouts, Some(listener)),
        };

        self.connections.insert(connection.id().clone(), Arc::clone(&connection));
        drop(state);

        self.recompute_routes();
        debug!(
            "Endpoint {} created connection {} ({}/{})",
            self.id,
            connection.id(),
            self.connection_count(),
            self.max_connections
        );
        Ok(connection)
    }

    /// Look up a connection by id
    pub fn connection(&self, id: &ConnectionId) -> Result<Arc<Connection>> {
        self.connections
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| GatewayError::ConnectionNotFound {
                connection_id: id.to_string(),
            })
    }

    /// Snapshot of the connections, ordered by creation
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        let mut connections: Vec<Arc<Connection>> =
            self.connections.iter().map(|entry| Arc::clone(entry.value())).collect();
        connections.sort_by(|a, b| {
            let (a, b) = (a.id().as_str(), b.id().as_str());
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        });
        connections
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections().iter().map(|c| c.id().clone()).collect()
    }

    /// Close and remove one connection, returning it with its final statistics
    pub async fn delete_connection(&self, id: &ConnectionId) -> Result<Arc<Connection>> {
        let connection = self.connection(id)?;
        connection.close().await?;
        self.detach(&connection);
        Ok(connection)
    }

    /// Close every connection that belongs to `call_id`
    pub async fn delete_call_connections(&self, call_id: &CallId) -> Vec<Arc<Connection>> {
        let doomed: Vec<Arc<Connection>> = self
            .connections()
            .into_iter()
            .filter(|c| c.call_id() == call_id)
            .collect();
        self.close_all(&doomed).await;
        doomed
    }

    /// Close every connection on the endpoint
    pub async fn delete_all_connections(&self) -> Vec<Arc<Connection>> {
        let doomed = self.connections();
        self.close_all(&doomed).await;
        doomed
    }

    async fn close_all(&self, connections: &[Arc<Connection>]) {
        let results = join_all(connections.iter().map(|c| c.close())).await;
        for (connection, result) in connections.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to close connection {} on {}: {}", connection.id(), self.id, e);
            }
            self.detach(connection);
        }
    }

    /// Close the endpoint once all of its connections are closed
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state != EndpointState::Active {
                return;
            }
            *state = EndpointState::Closing;
        }
        self.state_tx.send_replace(EndpointState::Closing);
        self.cancel_signals();

        let closed = self.delete_all_connections().await;

        *self.state.lock() = EndpointState::Closed;
        self.state_tx.send_replace(EndpointState::Closed);
        info!("Endpoint {} closed after closing {} connection(s)", self.id, closed.len());
    }

    // Remove a closed connection and give its capacity back. Safe to call
    // more than once for the same connection.
    fn detach(&self, connection: &Connection) {
        if self.connections.remove(connection.id()).is_some() {
            self.reserved.fetch_sub(1, Ordering::SeqCst);
            self.recompute_routes();
            trace!("Endpoint {} released connection {}", self.id, connection.id());
        }
    }

    /// Current media routes between connections
    pub fn routes(&self) -> Vec<MediaRoute> {
        self.routes.lock().clone()
    }

    fn recompute_routes(&self) {
        let views: Vec<ConnectionView> = self
            .connections()
            .iter()
            .filter(|c| !c.state().is_closed())
            .map(|c| ConnectionView {
                id: c.id().clone(),
                kind: c.kind(),
                mode: c.mode(),
            })
            .collect();
        let routes = self.kind.topology().routes(&views);
        *self.routes.lock() = routes;
    }

    /// Install a new notification request, cancelling running signals
    pub fn request_notification(&self, request: NotificationRequest, signals: Option<PreparedSignals>) {
        self.cancel_signals();
        debug!(
            "Endpoint {} notification request X:{} with {} event(s)",
            self.id,
            request.request_id,
            request.events.len()
        );
        self.notification.lock().apply(request);

        let Some(signals) = signals else {
            return;
        };
        let generation = self.signal_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = self.self_ref.clone();
        let task = tokio::spawn(async move {
            let outcomes = signals.run().await;
            let Some(endpoint) = weak.upgrade() else {
                return;
            };
            {
                let mut running = endpoint.signal_task.lock();
                if running.as_ref().map(|(g, _)| *g) != Some(generation) {
                    return;
                }
                running.take();
            }
            endpoint.notification.lock().signals_finished();
            for event in outcomes {
                endpoint.observe(event);
            }
        });
        *self.signal_task.lock() = Some((generation, task));
    }

    /// Stop running signals; their pooled resources go back to the pools
    pub fn cancel_signals(&self) {
        if let Some((_, task)) = self.signal_task.lock().take() {
            task.abort();
            debug!("Endpoint {} cancelled running signals", self.id);
        }
        self.notification.lock().signals_finished();
    }

    pub fn has_running_signals(&self) -> bool {
        self.signal_task.lock().as_ref().is_some_and(|(_, task)| !task.is_finished())
    }

    /// Notified entity supplied outside an RQNT (CRCX `N:`)
    pub fn set_notified_entity(&self, entity: impl Into<String>) {
        self.notification.lock().set_notified_entity(entity.into());
    }

    pub fn notification_state(&self) -> NotificationSnapshot {
        self.notification.lock().snapshot()
    }

    /// Feed a detected event into the notification state
    pub fn observe(&self, event: ObservedEvent) {
        let (outcome, target) = {
            let mut state = self.notification.lock();
            let outcome = state.observe(event);
            let target = state.target(self.context.default_notified_entity.as_deref());
            (outcome, target)
        };

        let EventOutcome::Notify { request_id, observed } = outcome else {
            return;
        };
        let Some(target) = target else {
            warn!("Endpoint {} has no notified entity, dropping {} event(s)", self.id, observed.len());
            return;
        };
        let Some(notifier) = &self.context.notifier else {
            debug!("Endpoint {} has no notification sink", self.id);
            return;
        };
        notifier.submit(Notification {
            endpoint: self.id.clone(),
            target,
            request_id,
            observed,
        });
    }
}

impl ConnectionListener for Endpoint {
    fn mode_updated(&self, connection: &Connection, old: ConnectionMode, new: ConnectionMode) {
        trace!("Endpoint {} connection {} mode {} -> {}", self.id, connection.id(), old, new);
        self.recompute_routes();
    }

    fn connection_closed(&self, connection: &Connection) {
        self.detach(connection);
    }

    fn media_event(&self, connection: &Connection, event: MediaEvent) {
        debug!("Endpoint {} event {} on connection {}", self.id, event.event, connection.id());
        let observed = match event.parameters {
            Some(parameters) => ObservedEvent::with_parameters(event.event, parameters),
            None => ObservedEvent::new(event.event),
        };
        self.observe(observed);
    }
}

impl MgcpMessageObserver for Endpoint {
    fn on_message(&self, message: &MgcpMessage, direction: MessageDirection, peer: SocketAddr) {
        if direction != MessageDirection::Incoming {
            return;
        }
        if let MgcpMessage::Request(request) = message {
            if request.endpoint.local_name().eq_ignore_ascii_case(self.id.local_name()) {
                self.notification.lock().remember_call_agent(peer);
            }
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id.to_string())
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("connections", &self.connection_count())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}
