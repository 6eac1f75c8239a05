//! # Connection State Machine
//!
//! A [`Connection`] is one leg of a media session on an endpoint. Remote
//! connections drive a pooled [`RtpChannel`]; local connections are paired
//! with a connection on another endpoint of the gateway.
//!
//! ## Operations
//!
//! | operation | from | to |
//! |-----------|------|----|
//! | [`half_open`](Connection::half_open) | NULL | HALF_OPEN |
//! | [`open`](Connection::open) | NULL, HALF_OPEN | OPEN |
//! | [`negotiate`](Connection::negotiate) | OPEN | OPEN |
//! | [`update_mode`](Connection::update_mode) | HALF_OPEN, OPEN | unchanged |
//! | [`close`](Connection::close) | any | CLOSED |
//!
//! Only one of `half_open`, `open`, `negotiate` and `update_mode` may be
//! outstanding at a time. The slot is taken with a compare-and-swap; a second
//! caller gets [`GatewayError::IllegalState`] immediately and the call agent
//! retries through MGCP retransmission.
//!
//! `close` is accepted at any time, including while an operation is in
//! flight. The connection becomes CLOSED at once; the outstanding operation
//! then completes with [`GatewayError::ConnectionClosed`] and leaves the state
//! alone. Closing twice is a no-op.
//!
//! Every transition is published on a [`watch`] channel and appended to the
//! connection's history.

mod id;
mod state;

pub use id::{CallId, ConnectionId};
pub use state::{ConnectionKind, ConnectionState, ConnectionTimeouts};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use rvoip_mgcp_core::{ConnectionMode, EndpointId, EventName, LocalConnectionOptions, RequestedEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::errors::{GatewayError, Result};
use crate::media::{ConnectionStatistics, MediaEvent, RtpChannel};
use crate::pool::ResourcePool;

/// Receives connection changes; implemented by endpoints
pub trait ConnectionListener: Send + Sync {
    /// The connection mode changed
    fn mode_updated(&self, connection: &Connection, old: ConnectionMode, new: ConnectionMode);

    /// The connection reached CLOSED
    fn connection_closed(&self, connection: &Connection);

    /// A requested media event was detected on the connection
    fn media_event(&self, connection: &Connection, event: MediaEvent);
}

/// A pooled RTP channel together with the pool it goes back to
#[derive(Clone)]
pub struct ChannelHandle {
    channel: Arc<dyn RtpChannel>,
    pool: Arc<ResourcePool<dyn RtpChannel>>,
}

impl ChannelHandle {
    pub fn new(channel: Arc<dyn RtpChannel>, pool: Arc<ResourcePool<dyn RtpChannel>>) -> Self {
        Self { channel, pool }
    }

    pub fn channel(&self) -> &Arc<dyn RtpChannel> {
        &self.channel
    }
}

struct ConnectionInner {
    state: ConnectionState,
    mode: ConnectionMode,
    options: LocalConnectionOptions,
    local_sdp: Option<String>,
    remote_sdp: Option<String>,
    history: Vec<ConnectionState>,
    peer: Option<Weak<Connection>>,
    events: Vec<RequestedEvent>,
    opened_at: Option<Instant>,
    final_statistics: Option<ConnectionStatistics>,
    channel_released: bool,
}

#[derive(Default)]
struct ConnectionTasks {
    half_open_timer: Option<JoinHandle<()>>,
    lifetime_timer: Option<JoinHandle<()>>,
    event_forwarder: Option<JoinHandle<()>>,
}

impl ConnectionTasks {
    fn abort_all(&mut self) {
        for handle in [
            self.half_open_timer.take(),
            self.lifetime_timer.take(),
            self.event_forwarder.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

/// The in-flight operation slot; freed on drop
struct OperationSlot<'a> {
    connection: &'a Connection,
}

impl Drop for OperationSlot<'_> {
    fn drop(&mut self) {
        self.connection.in_flight.store(false, Ordering::SeqCst);
        // close() skips the channel release while an operation is outstanding
        if self.connection.state().is_closed() {
            self.connection.spawn_channel_release();
        }
    }
}

/// One media connection on an endpoint
pub struct Connection {
    id: ConnectionId,
    call_id: CallId,
    endpoint: EndpointId,
    kind: ConnectionKind,
    channel: Option<ChannelHandle>,
    timeouts: ConnectionTimeouts,
    listener: Option<Weak<dyn ConnectionListener>>,
    inner: Mutex<ConnectionInner>,
    in_flight: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
    tasks: Mutex<ConnectionTasks>,
    self_ref: Weak<Connection>,
    created_at: Instant,
}

impl Connection {
    /// A connection to a remote RTP peer using `channel`
    pub fn remote(
        call_id: CallId,
        endpoint: EndpointId,
        channel: ChannelHandle,
        timeouts: ConnectionTimeouts,
        listener: Option<Weak<dyn ConnectionListener>>,
    ) -> Arc<Self> {
        Self::build(call_id, endpoint, ConnectionKind::Remote, Some(channel), timeouts, listener)
    }

    /// A local connection, to be [paired](Connection::pair) before it is opened
    pub fn local(
        call_id: CallId,
        endpoint: EndpointId,
        timeouts: ConnectionTimeouts,
        listener: Option<Weak<dyn ConnectionListener>>,
    ) -> Arc<Self> {
        Self::build(call_id, endpoint, ConnectionKind::Local, None, timeouts, listener)
    }

    fn build(
        call_id: CallId,
        endpoint: EndpointId,
        kind: ConnectionKind,
        channel: Option<ChannelHandle>,
        timeouts: ConnectionTimeouts,
        listener: Option<Weak<dyn ConnectionListener>>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Null);
        let connection = Arc::new_cyclic(|self_ref| Connection {
            id: ConnectionId::next(),
            call_id,
            endpoint,
            kind,
            channel,
            timeouts,
            listener,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Null,
                mode: ConnectionMode::Inactive,
                options: LocalConnectionOptions::new(),
                local_sdp: None,
                remote_sdp: None,
                history: vec![ConnectionState::Null],
                peer: None,
                events: Vec::new(),
                opened_at: None,
                final_statistics: None,
                channel_released: false,
            }),
            in_flight: AtomicBool::new(false),
            state_tx,
            tasks: Mutex::new(ConnectionTasks::default()),
            self_ref: self_ref.clone(),
            created_at: Instant::now(),
        });
        debug!("Created {:?} connection {} on {}", kind, connection.id, connection.endpoint);
        connection
    }

    /// Pair two local connections so media flows between their endpoints
    pub fn pair(a: &Arc<Connection>, b: &Arc<Connection>) -> Result<()> {
        if a.kind != ConnectionKind::Local || b.kind != ConnectionKind::Local {
            return Err(GatewayError::illegal_state("only local connections can be paired"));
        }
        if Arc::ptr_eq(a, b) {
            return Err(GatewayError::illegal_state("a connection cannot be paired with itself"));
        }
        a.inner.lock().peer = Some(Arc::downgrade(b));
        b.inner.lock().peer = Some(Arc::downgrade(a));
        debug!("Paired local connections {} and {}", a.id, b.id);
        Ok(())
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Endpoint that owns the connection
    pub fn endpoint_id(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn is_local(&self) -> bool {
        self.kind == ConnectionKind::Local
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn mode(&self) -> ConnectionMode {
        self.inner.lock().mode
    }

    pub fn options(&self) -> LocalConnectionOptions {
        self.inner.lock().options.clone()
    }

    /// Replace the local connection options used by the next negotiation
    pub fn set_options(&self, options: LocalConnectionOptions) {
        self.inner.lock().options = options;
    }

    pub fn local_description(&self) -> Option<String> {
        self.inner.lock().local_sdp.clone()
    }

    pub fn remote_description(&self) -> Option<String> {
        self.inner.lock().remote_sdp.clone()
    }

    /// Paired connection, for local connections that are still alive
    pub fn peer(&self) -> Option<Arc<Connection>> {
        self.inner.lock().peer.as_ref().and_then(Weak::upgrade)
    }

    /// All states the connection went through, starting with NULL
    pub fn history(&self) -> Vec<ConnectionState> {
        self.inner.lock().history.clone()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Events registered through [`Connection::register_events`]
    pub fn requested_events(&self) -> Vec<RequestedEvent> {
        self.inner.lock().events.clone()
    }

    /// Time since creation
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Counters for DLCX/AUCX; frozen at the moment the connection closed
    pub fn statistics(&self) -> ConnectionStatistics {
        let inner = self.inner.lock();
        match &inner.final_statistics {
            Some(stats) => stats.clone(),
            None => self.live_statistics(&inner),
        }
    }

    fn live_statistics(&self, inner: &ConnectionInner) -> ConnectionStatistics {
        match &self.channel {
            Some(handle) => handle.channel.statistics(),
            None => ConnectionStatistics {
                duration: inner.opened_at.map(|t| t.elapsed()).unwrap_or_default(),
                ..Default::default()
            },
        }
    }

    fn listener(&self) -> Option<Arc<dyn ConnectionListener>> {
        self.listener.as_ref().and_then(Weak::upgrade)
    }

    fn closed_error(&self) -> GatewayError {
        GatewayError::ConnectionClosed {
            connection_id: self.id.to_string(),
        }
    }

    fn begin_operation(&self, operation: &str) -> Result<OperationSlot<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                GatewayError::illegal_state(format!(
                    "{} rejected: another operation is in flight on connection {}",
                    operation, self.id
                ))
            })?;
        Ok(OperationSlot { connection: self })
    }

    fn transition(&self, inner: &mut ConnectionInner, to: ConnectionState) {
        let from = inner.state;
        inner.state = to;
        inner.history.push(to);
        self.state_tx.send_replace(to);
        debug!("Connection {} {} -> {}", self.id, from, to);
    }

    /// Allocate media resources without a remote description
    pub async fn half_open(&self) -> Result<()> {
        let _slot = self.begin_operation("half_open")?;
        let options = {
            let inner = self.inner.lock();
            match inner.state {
                ConnectionState::Null => {}
                ConnectionState::Closed => return Err(self.closed_error()),
                state => {
                    return Err(GatewayError::illegal_state(format!(
                        "cannot half-open connection {} in state {}",
                        self.id, state
                    )));
                }
            }
            inner.options.clone()
        };

        let local_sdp = match &self.channel {
            Some(handle) => Some(handle.channel.half_open(&options).await?),
            None => None,
        };

        {
            let mut inner = self.inner.lock();
            if inner.state.is_closed() {
                trace!("Connection {} closed while half-opening", self.id);
                return Err(self.closed_error());
            }
            inner.local_sdp = local_sdp;
            self.transition(&mut inner, ConnectionState::HalfOpen);
        }

        self.start_event_forwarder();
        self.arm_half_open_timer();
        Ok(())
    }

    /// Open the connection, returning the local description for remote connections
    ///
    /// Remote connections need the remote description; local connections need
    /// a peer.
    pub async fn open(&self, remote_sdp: Option<&str>) -> Result<Option<String>> {
        let _slot = self.begin_operation("open")?;
        let options = {
            let inner = self.inner.lock();
            match inner.state {
                ConnectionState::Null | ConnectionState::HalfOpen => {}
                ConnectionState::Closed => return Err(self.closed_error()),
                ConnectionState::Open => {
                    return Err(GatewayError::illegal_state(format!(
                        "connection {} is already open",
                        self.id
                    )));
                }
            }
            inner.options.clone()
        };

        let local_sdp = match &self.channel {
            Some(handle) => {
                let remote = remote_sdp.ok_or(GatewayError::MissingRemoteDescription)?;
                Some(handle.channel.open(remote, &options).await?)
            }
            None => {
                if self.peer().is_none() {
                    return Err(GatewayError::illegal_state(format!(
                        "local connection {} has no peer",
                        self.id
                    )));
                }
                None
            }
        };

        {
            let mut inner = self.inner.lock();
            if inner.state.is_closed() {
                trace!("Connection {} closed while opening", self.id);
                return Err(self.closed_error());
            }
            if local_sdp.is_some() {
                inner.local_sdp = local_sdp.clone();
            }
            inner.remote_sdp = remote_sdp.map(str::to_string);
            inner.opened_at = Some(Instant::now());
            self.transition(&mut inner, ConnectionState::Open);
        }

        if let Some(timer) = self.tasks.lock().half_open_timer.take() {
            timer.abort();
        }
        self.start_event_forwarder();
        self.arm_lifetime_timer();
        Ok(local_sdp)
    }

    /// Renegotiate an open remote connection
    pub async fn negotiate(&self, remote_sdp: &str) -> Result<String> {
        let _slot = self.begin_operation("negotiate")?;
        match self.state() {
            ConnectionState::Open => {}
            ConnectionState::Closed => return Err(self.closed_error()),
            state => {
                return Err(GatewayError::illegal_state(format!(
                    "cannot renegotiate connection {} in state {}",
                    self.id, state
                )));
            }
        }
        let handle = self.channel.as_ref().ok_or_else(|| {
            GatewayError::illegal_state(format!("local connection {} has no session description", self.id))
        })?;

        let local_sdp = handle.channel.modify(remote_sdp).await?;

        let mut inner = self.inner.lock();
        if inner.state.is_closed() {
            return Err(self.closed_error());
        }
        inner.local_sdp = Some(local_sdp.clone());
        inner.remote_sdp = Some(remote_sdp.to_string());
        debug!("Connection {} renegotiated", self.id);
        Ok(local_sdp)
    }

    /// Change the media direction
    pub async fn update_mode(&self, mode: ConnectionMode) -> Result<()> {
        let _slot = self.begin_operation("update_mode")?;
        match self.state() {
            ConnectionState::HalfOpen | ConnectionState::Open => {}
            ConnectionState::Closed => return Err(self.closed_error()),
            state => {
                return Err(GatewayError::illegal_state(format!(
                    "cannot change mode of connection {} in state {}",
                    self.id, state
                )));
            }
        }
        if self.is_local()
            && matches!(
                mode,
                ConnectionMode::ContinuityTest | ConnectionMode::NetworkTest | ConnectionMode::NetworkLoop
            )
        {
            return Err(GatewayError::InvalidMode {
                mode: mode.to_string(),
            });
        }

        if let Some(handle) = &self.channel {
            handle.channel.update_mode(mode).await?;
        }

        let old = {
            let mut inner = self.inner.lock();
            if inner.state.is_closed() {
                return Err(self.closed_error());
            }
            std::mem::replace(&mut inner.mode, mode)
        };

        if old != mode {
            debug!("Connection {} mode {} -> {}", self.id, old, mode);
            if let Some(listener) = self.listener() {
                listener.mode_updated(self, old, mode);
            }
        }
        Ok(())
    }

    /// Close the connection and release its media resources
    ///
    /// Closing a closed connection is a no-op. A local connection closes its
    /// peer as well.
    pub async fn close(&self) -> Result<()> {
        let Some((peer, release_now)) = self.mark_closed() else {
            trace!("Connection {} already closed", self.id);
            return Ok(());
        };

        if release_now {
            self.release_channel().await;
        }
        if let Some(peer) = peer.and_then(|peer| peer.upgrade()) {
            if peer.mark_closed().is_some() {
                peer.finish_close();
            }
        }
        self.finish_close();
        Ok(())
    }

    // Synchronous half of close: CLOSED transition, timers, peer link.
    // Returns None when the connection was already closed.
    fn mark_closed(&self) -> Option<(Option<Weak<Connection>>, bool)> {
        let mut inner = self.inner.lock();
        if inner.state.is_closed() {
            return None;
        }
        inner.final_statistics = Some(self.live_statistics(&inner));
        self.transition(&mut inner, ConnectionState::Closed);
        let release_now = !self.in_flight.load(Ordering::SeqCst);
        let peer = inner.peer.take();
        drop(inner);

        self.tasks.lock().abort_all();
        Some((peer, release_now))
    }

    fn finish_close(&self) {
        info!("Connection {} on {} closed", self.id, self.endpoint);
        if let Some(listener) = self.listener() {
            listener.connection_closed(self);
        }
    }

    async fn release_channel(&self) {
        let Some(handle) = &self.channel else {
            return;
        };
        {
            let mut inner = self.inner.lock();
            if inner.channel_released {
                return;
            }
            inner.channel_released = true;
        }
        if let Err(e) = handle.channel.close().await {
            warn!("RTP channel of connection {} failed to close: {}", self.id, e);
        }
        handle.channel.reset();
        handle.pool.release(&handle.channel);
    }

    fn spawn_channel_release(&self) {
        let Some(connection) = self.self_ref.upgrade() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { connection.release_channel().await });
        }
    }

    /// Register connection-scoped events, rejecting any the channel cannot detect
    pub fn register_events(&self, events: Vec<RequestedEvent>) -> Result<()> {
        if self.state().is_closed() {
            return Err(self.closed_error());
        }
        if let Some(requested) = events.iter().find(|r| !self.supports_event(&r.event)) {
            return Err(GatewayError::UnsupportedEvent {
                event: requested.event.to_string(),
            });
        }
        self.inner.lock().events = events;
        Ok(())
    }

    /// Whether the media channel can detect `event`; local connections detect nothing
    pub fn supports_event(&self, event: &EventName) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|handle| handle.channel.supports_event(event))
    }

    fn on_media_event(&self, event: MediaEvent) {
        let requested = self
            .inner
            .lock()
            .events
            .iter()
            .any(|requested| requested.event.matches(&event.event));
        if !requested {
            trace!("Connection {} ignoring unrequested event {}", self.id, event.event);
            return;
        }

        let event = MediaEvent {
            event: event.event.on_connection(self.id.to_string()),
            parameters: event.parameters,
        };
        if let Some(listener) = self.listener() {
            listener.media_event(self, event);
        }
    }

    fn start_event_forwarder(&self) {
        let Some(handle) = &self.channel else {
            return;
        };
        let mut tasks = self.tasks.lock();
        if tasks.event_forwarder.is_some() {
            return;
        }
        let Some(mut events) = handle.channel.take_events() else {
            return;
        };

        let weak = self.self_ref.clone();
        tasks.event_forwarder = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(connection) = weak.upgrade() else {
                    break;
                };
                connection.on_media_event(event);
            }
        }));
    }

    fn arm_half_open_timer(&self) {
        let timeout = self.timeouts.half_open;
        if timeout.is_zero() {
            return;
        }

        let weak = self.self_ref.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(connection) = weak.upgrade() else {
                return;
            };
            // Detach our own handle so close() does not abort this task
            connection.tasks.lock().half_open_timer.take();
            if connection.state() == ConnectionState::HalfOpen {
                warn!("Connection {} half-open for {:?}, closing", connection.id, timeout);
                let _ = connection.close().await;
            }
        });

        if let Some(previous) = self.tasks.lock().half_open_timer.replace(timer) {
            previous.abort();
        }
    }

    fn arm_lifetime_timer(&self) {
        let Some(lifetime) = self.timeouts.lifetime else {
            return;
        };

        let weak = self.self_ref.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            let Some(connection) = weak.upgrade() else {
                return;
            };
            connection.tasks.lock().lifetime_timer.take();
            if !connection.state().is_closed() {
                warn!("Connection {} reached its {:?} lifetime, closing", connection.id, lifetime);
                let _ = connection.close().await;
            }
        });

        if let Some(previous) = self.tasks.lock().lifetime_timer.replace(timer) {
            previous.abort();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("call_id", &self.call_id)
            .field("endpoint", &self.endpoint.to_string())
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::media::{BasicMediaFactory, MediaResourceFactory};
    use crate::config::RtpConfig;

    const OFFER: &str = "v=0\r\nc=IN IP4 10.0.0.5\r\nm=audio 4000 RTP/AVP 0\r\n";

    fn rtp_pool(capacity: usize) -> Arc<ResourcePool<dyn RtpChannel>> {
        let factory = Arc::new(BasicMediaFactory::new(&RtpConfig::default()));
        Arc::new(ResourcePool::new("rtp", capacity, move || factory.create_rtp_channel()))
    }

    fn remote_connection(pool: &Arc<ResourcePool<dyn RtpChannel>>, timeouts: ConnectionTimeouts) -> Arc<Connection> {
        let channel = pool.acquire().expect("rtp channel");
        Connection::remote(
            CallId::new("CALL-1"),
            "ivr/1@gw".parse().unwrap(),
            ChannelHandle::new(channel, Arc::clone(pool)),
            timeouts,
            None,
        )
    }

    #[tokio::test]
    async fn test_half_open_then_open() {
        let pool = rtp_pool(1);
        let conn = remote_connection(&pool, ConnectionTimeouts::default());

        conn.half_open().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::HalfOpen);
        assert!(conn.local_description().unwrap().starts_with("v=0"));

        let answer = conn.open(Some(OFFER)).await.unwrap().unwrap();
        assert!(answer.contains("m=audio"));
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(
            conn.history(),
            vec![ConnectionState::Null, ConnectionState::HalfOpen, ConnectionState::Open]
        );
    }

    #[tokio::test]
    async fn test_remote_open_requires_sdp() {
        let pool = rtp_pool(1);
        let conn = remote_connection(&pool, ConnectionTimeouts::default());
        assert_eq!(conn.open(None).await.unwrap_err(), GatewayError::MissingRemoteDescription);
        assert_eq!(conn.state(), ConnectionState::Null);
    }

    #[tokio::test]
    async fn test_negotiate_before_open_is_rejected() {
        let pool = rtp_pool(1);
        let conn = remote_connection(&pool, ConnectionTimeouts::default());
        conn.half_open().await.unwrap();
        assert!(matches!(conn.negotiate(OFFER).await, Err(GatewayError::IllegalState { .. })));

        conn.open(Some(OFFER)).await.unwrap();
        assert!(conn.negotiate(OFFER).await.is_ok());
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_close_twice_releases_channel_once() {
        let pool = rtp_pool(1);
        let conn = remote_connection(&pool, ConnectionTimeouts::default());
        conn.open(Some(OFFER)).await.unwrap();
        assert_eq!(pool.in_use(), 1);

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(
            conn.history(),
            vec![ConnectionState::Null, ConnectionState::Open, ConnectionState::Closed]
        );
        assert!(matches!(conn.open(Some(OFFER)).await, Err(GatewayError::ConnectionClosed { .. })));
    }

    #[tokio::test]
    async fn test_second_operation_while_in_flight_is_rejected() {
        let pool = rtp_pool(1);
        let conn = remote_connection(&pool, ConnectionTimeouts::default());
        let slot = conn.begin_operation("open").unwrap();
        assert!(matches!(conn.half_open().await, Err(GatewayError::IllegalState { .. })));
        drop(slot);
        assert!(conn.half_open().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_during_operation_defers_release() {
        let pool = rtp_pool(1);
        let conn = remote_connection(&pool, ConnectionTimeouts::default());
        let slot = conn.begin_operation("open").unwrap();

        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(pool.in_use(), 1);

        drop(slot);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn test_local_pair_closes_together() {
        let timeouts = ConnectionTimeouts::default();
        let a = Connection::local(CallId::new("C"), "bridge/1@gw".parse().unwrap(), timeouts, None);
        let b = Connection::local(CallId::new("C"), "bridge/2@gw".parse().unwrap(), timeouts, None);
        assert!(matches!(a.open(None).await, Err(GatewayError::IllegalState { .. })));

        Connection::pair(&a, &b).unwrap();
        assert_eq!(a.open(None).await.unwrap(), None);
        b.open(None).await.unwrap();
        assert!(matches!(
            a.update_mode(ConnectionMode::NetworkTest).await,
            Err(GatewayError::InvalidMode { .. })
        ));

        a.close().await.unwrap();
        assert_eq!(b.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_timeout_closes_connection() {
        let pool = rtp_pool(1);
        let timeouts = ConnectionTimeouts {
            half_open: Duration::from_secs(5),
            lifetime: None,
        };
        let conn = remote_connection(&pool, timeouts);
        conn.half_open().await.unwrap();

        let mut states = conn.subscribe();
        tokio::time::sleep(Duration::from_secs(6)).await;
        states.wait_for(|s| s.is_closed()).await.unwrap();
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_cancels_half_open_timer() {
        let pool = rtp_pool(1);
        let timeouts = ConnectionTimeouts {
            half_open: Duration::from_secs(5),
            lifetime: None,
        };
        let conn = remote_connection(&pool, timeouts);
        conn.half_open().await.unwrap();
        conn.open(Some(OFFER)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_event_registration_is_validated() {
        let pool = rtp_pool(1);
        let conn = remote_connection(&pool, ConnectionTimeouts::default());
        let rto = RequestedEvent::notify("R/rto".parse().unwrap());
        let oc = RequestedEvent::notify("AU/oc".parse().unwrap());

        assert!(conn.register_events(vec![rto.clone()]).is_ok());
        assert!(matches!(
            conn.register_events(vec![rto, oc]),
            Err(GatewayError::UnsupportedEvent { .. })
        ));
        assert_eq!(conn.requested_events().len(), 1);
    }
}
