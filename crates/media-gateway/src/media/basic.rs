//! Built-in media resources
//!
//! [`BasicRtpChannel`] allocates RTP ports from the configured range and
//! answers SDP offers, [`VirtualPlayer`], [`VirtualRecorder`] and
//! [`VirtualDtmfDetector`] complete IVR operations without audio I/O. They let
//! the gateway run, and be tested, without a media engine behind it.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rvoip_mgcp_core::{ConnectionMode, EventName, LocalConnectionOptions};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

use crate::config::RtpConfig;
use crate::errors::{GatewayError, Result};
use crate::media::sdp::{self, RemoteDescription};
use crate::media::{
    ConnectionStatistics, DtmfDetector, MediaEvent, MediaResourceFactory, Player, Recorder, RtpChannel,
};

/// Hands out even RTP ports from a fixed range
#[derive(Debug)]
pub struct PortAllocator {
    free: Mutex<VecDeque<u16>>,
}

impl PortAllocator {
    pub fn new(min: u16, max: u16) -> Self {
        let free = (min..=max).filter(|port| port % 2 == 0).collect();
        Self { free: Mutex::new(free) }
    }

    pub fn allocate(&self) -> Option<u16> {
        self.free.lock().pop_front()
    }

    pub fn release(&self, port: u16) {
        let mut free = self.free.lock();
        if !free.contains(&port) {
            free.push_back(port);
        }
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

#[derive(Debug)]
struct ChannelState {
    port: Option<u16>,
    session_id: u64,
    version: u64,
    offered: Vec<u8>,
    negotiated: Vec<u8>,
    mode: ConnectionMode,
    remote: Option<RemoteDescription>,
    opened_at: Option<Instant>,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            port: None,
            session_id: u64::from(rand::random::<u32>()),
            version: 0,
            offered: Vec::new(),
            negotiated: Vec::new(),
            mode: ConnectionMode::Inactive,
            remote: None,
            opened_at: None,
        }
    }
}

#[derive(Debug)]
struct EventChannel {
    tx: mpsc::UnboundedSender<MediaEvent>,
    rx: Option<mpsc::UnboundedReceiver<MediaEvent>>,
}

impl EventChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

/// RTP channel that negotiates SDP and reserves a port but moves no packets
#[derive(Debug)]
pub struct BasicRtpChannel {
    ports: Arc<PortAllocator>,
    address: IpAddr,
    state: Mutex<ChannelState>,
    events: Mutex<EventChannel>,
}

impl BasicRtpChannel {
    pub fn new(ports: Arc<PortAllocator>, address: IpAddr) -> Self {
        Self {
            ports,
            address,
            state: Mutex::new(ChannelState::new()),
            events: Mutex::new(EventChannel::new()),
        }
    }

    /// Local RTP port, once allocated
    pub fn port(&self) -> Option<u16> {
        self.state.lock().port
    }

    /// Report an event as if the media stream had produced it
    pub fn emit(&self, event: MediaEvent) {
        let _ = self.events.lock().tx.send(event);
    }

    fn ensure_port(&self, state: &mut ChannelState, options: &LocalConnectionOptions) -> Result<u16> {
        if let Some(port) = state.port {
            return Ok(port);
        }
        let port = self
            .ports
            .allocate()
            .ok_or_else(|| GatewayError::resource_unavailable("RTP port range exhausted"))?;
        state.port = Some(port);
        state.offered = sdp::payload_types_for(&options.codecs());
        debug!("RTP channel allocated port {}", port);
        Ok(port)
    }

    fn local_description(&self, state: &mut ChannelState, port: u16) -> String {
        state.version += 1;
        let payloads = if state.negotiated.is_empty() {
            &state.offered
        } else {
            &state.negotiated
        };
        sdp::build_local(state.session_id, state.version, self.address, port, payloads, state.mode)
    }

    fn release_port(&self, state: &mut ChannelState) {
        if let Some(port) = state.port.take() {
            self.ports.release(port);
            trace!("RTP channel released port {}", port);
        }
    }
}

#[async_trait]
impl RtpChannel for BasicRtpChannel {
    async fn half_open(&self, options: &LocalConnectionOptions) -> Result<String> {
        let mut state = self.state.lock();
        let port = self.ensure_port(&mut state, options)?;
        Ok(self.local_description(&mut state, port))
    }

    async fn open(&self, remote_sdp: &str, options: &LocalConnectionOptions) -> Result<String> {
        let remote = sdp::parse_remote(remote_sdp)?;
        let mut state = self.state.lock();
        let port = self.ensure_port(&mut state, options)?;
        state.negotiated = sdp::negotiate(&state.offered, &remote)?;
        state.remote = Some(remote);
        state.opened_at = Some(Instant::now());
        Ok(self.local_description(&mut state, port))
    }

    async fn modify(&self, remote_sdp: &str) -> Result<String> {
        let remote = sdp::parse_remote(remote_sdp)?;
        let mut state = self.state.lock();
        let port = match (state.port, state.remote.is_some()) {
            (Some(port), true) => port,
            _ => return Err(GatewayError::illegal_state("channel is not open")),
        };
        state.negotiated = sdp::negotiate(&state.offered, &remote)?;
        state.remote = Some(remote);
        Ok(self.local_description(&mut state, port))
    }

    async fn update_mode(&self, mode: ConnectionMode) -> Result<()> {
        self.state.lock().mode = mode;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.release_port(&mut state);
        state.remote = None;
        Ok(())
    }

    fn statistics(&self) -> ConnectionStatistics {
        let state = self.state.lock();
        ConnectionStatistics {
            duration: state.opened_at.map(|t| t.elapsed()).unwrap_or_default(),
            ..Default::default()
        }
    }

    fn supports_event(&self, event: &EventName) -> bool {
        event.package_name() == "R"
            && (event.name.eq_ignore_ascii_case("rto") || event.name.eq_ignore_ascii_case("iceto"))
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<MediaEvent>> {
        self.events.lock().rx.take()
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        self.release_port(&mut state);
        *state = ChannelState::new();
        *self.events.lock() = EventChannel::new();
    }
}

/// Player that takes a fixed time per iteration and produces no audio
#[derive(Debug)]
pub struct VirtualPlayer {
    duration: Duration,
}

impl VirtualPlayer {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Player for VirtualPlayer {
    async fn play(&self, uri: &str, iterations: u32) -> Result<()> {
        if uri.trim().is_empty() {
            return Err(GatewayError::media("empty announcement"));
        }
        trace!("Playing {} x{}", uri, iterations);
        let total = self.duration.saturating_mul(iterations.max(1));
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
        Ok(())
    }

    fn reset(&self) {}
}

/// Recorder that reports a fixed recording length
#[derive(Debug)]
pub struct VirtualRecorder {
    duration: Duration,
}

impl VirtualRecorder {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Recorder for VirtualRecorder {
    async fn record(&self, uri: &str, max_duration: Duration) -> Result<Duration> {
        if uri.trim().is_empty() {
            return Err(GatewayError::media("empty recording uri"));
        }
        let length = self.duration.min(max_duration);
        if !length.is_zero() {
            tokio::time::sleep(length).await;
        }
        Ok(length)
    }

    fn reset(&self) {}
}

/// Detector fed through [`DtmfDetector::detected`]
#[derive(Debug, Default)]
pub struct VirtualDtmfDetector {
    buffer: Mutex<String>,
    notify: Notify,
}

impl VirtualDtmfDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn take(&self, max: usize) -> String {
        let mut buffer = self.buffer.lock();
        let n = buffer.len().min(max);
        buffer.drain(..n).collect()
    }
}

#[async_trait]
impl DtmfDetector for VirtualDtmfDetector {
    async fn collect(&self, max_digits: usize, timeout: Duration) -> Result<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.buffer.lock().len() >= max_digits {
                return Ok(self.take(max_digits));
            }
            tokio::select! {
                _ = self.notify.notified() => continue,
                _ = tokio::time::sleep_until(deadline) => return Ok(self.take(max_digits)),
            }
        }
    }

    fn detected(&self, digits: &str) {
        self.buffer
            .lock()
            .extend(digits.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '*' || *c == '#'));
        self.notify.notify_one();
    }

    fn reset(&self) {
        self.buffer.lock().clear();
    }
}

/// Factory for the built-in resources
#[derive(Debug)]
pub struct BasicMediaFactory {
    ports: Arc<PortAllocator>,
    address: IpAddr,
    play_duration: Duration,
    record_duration: Duration,
}

impl BasicMediaFactory {
    pub fn new(config: &RtpConfig) -> Self {
        Self {
            ports: Arc::new(PortAllocator::new(config.port_min, config.port_max)),
            address: config.local_address,
            play_duration: Duration::ZERO,
            record_duration: Duration::ZERO,
        }
    }

    /// Time a virtual announcement takes per iteration
    pub fn with_play_duration(mut self, duration: Duration) -> Self {
        self.play_duration = duration;
        self
    }

    /// Length reported by virtual recordings
    pub fn with_record_duration(mut self, duration: Duration) -> Self {
        self.record_duration = duration;
        self
    }

    /// Shared port allocator
    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }
}

impl MediaResourceFactory for BasicMediaFactory {
    fn create_rtp_channel(&self) -> Arc<dyn RtpChannel> {
        Arc::new(BasicRtpChannel::new(Arc::clone(&self.ports), self.address))
    }

    fn create_player(&self) -> Arc<dyn Player> {
        Arc::new(VirtualPlayer::new(self.play_duration))
    }

    fn create_recorder(&self) -> Arc<dyn Recorder> {
        Arc::new(VirtualRecorder::new(self.record_duration))
    }

    fn create_dtmf_detector(&self) -> Arc<dyn DtmfDetector> {
        Arc::new(VirtualDtmfDetector::new())
    }
}
