//! # Media Capabilities
//!
//! The control plane never touches audio. It drives media through the narrow
//! capabilities defined here:
//!
//! - [`RtpChannel`] - the RTP side of a remote connection (half-open, open,
//!   renegotiate, change direction, close, statistics, media events)
//! - [`Player`], [`Recorder`], [`DtmfDetector`] - IVR resources used by signals
//! - [`MediaResourceFactory`] - creates the above for the [`pools`](crate::pool)
//!
//! [`basic`] provides a stand-alone implementation that allocates RTP ports and
//! exchanges SDP without moving audio, which is what tests and simple
//! deployments use.

pub mod basic;
pub mod sdp;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rvoip_mgcp_core::{ConnectionMode, EventName, LocalConnectionOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::Result;

pub use basic::{BasicMediaFactory, BasicRtpChannel, VirtualDtmfDetector, VirtualPlayer, VirtualRecorder};

/// Counters reported by DLCX and AUCX in the `P:` parameter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatistics {
    pub packets_sent: u64,
    pub octets_sent: u64,
    pub packets_received: u64,
    pub octets_received: u64,
    pub packets_lost: u64,
    /// Interarrival jitter in milliseconds
    pub jitter_ms: u32,
    /// Average latency in milliseconds
    pub latency_ms: u32,
    /// Time since the connection was opened
    pub duration: Duration,
}

impl ConnectionStatistics {
    /// Render as a `P:` value (`PS=.., OS=.., PR=.., OR=.., PL=.., JI=.., LA=..`)
    pub fn to_parameter_value(&self) -> String {
        format!(
            "PS={}, OS={}, PR={}, OR={}, PL={}, JI={}, LA={}",
            self.packets_sent,
            self.octets_sent,
            self.packets_received,
            self.octets_received,
            self.packets_lost,
            self.jitter_ms,
            self.latency_ms
        )
    }
}

/// An event detected by a media resource, e.g. `R/rto`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEvent {
    pub event: EventName,
    pub parameters: Option<String>,
}

impl MediaEvent {
    pub fn new(event: EventName) -> Self {
        Self {
            event,
            parameters: None,
        }
    }

    pub fn with_parameters(event: EventName, parameters: impl Into<String>) -> Self {
        Self {
            event,
            parameters: Some(parameters.into()),
        }
    }
}

/// RTP side of a remote connection
///
/// Every operation completes exactly once with the local session description
/// or an error. Channels are pooled: [`RtpChannel::reset`] is called before a
/// channel goes back to its pool.
#[async_trait]
pub trait RtpChannel: Send + Sync + fmt::Debug {
    /// Allocate transport resources and produce a local offer
    async fn half_open(&self, options: &LocalConnectionOptions) -> Result<String>;

    /// Apply the remote description and produce the local answer
    ///
    /// Allocates resources first when the channel was not half-opened.
    async fn open(&self, remote_sdp: &str, options: &LocalConnectionOptions) -> Result<String>;

    /// Renegotiate an open channel
    async fn modify(&self, remote_sdp: &str) -> Result<String>;

    /// Change media direction without renegotiating
    async fn update_mode(&self, mode: ConnectionMode) -> Result<()>;

    /// Release transport resources
    async fn close(&self) -> Result<()>;

    /// Current counters
    fn statistics(&self) -> ConnectionStatistics;

    /// Whether the channel can report `event`
    fn supports_event(&self, event: &EventName) -> bool;

    /// Receiver of detected events; yields `Some` once per channel use
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<MediaEvent>>;

    /// Forget all per-connection state
    fn reset(&self);
}

/// Announcement player
#[async_trait]
pub trait Player: Send + Sync + fmt::Debug {
    /// Play `uri` `iterations` times
    async fn play(&self, uri: &str, iterations: u32) -> Result<()>;

    fn reset(&self);
}

/// Audio recorder
#[async_trait]
pub trait Recorder: Send + Sync + fmt::Debug {
    /// Record into `uri` for at most `max_duration`, returning the recorded length
    async fn record(&self, uri: &str, max_duration: Duration) -> Result<Duration>;

    fn reset(&self);
}

/// DTMF digit collector
#[async_trait]
pub trait DtmfDetector: Send + Sync + fmt::Debug {
    /// Collect up to `max_digits` digits, stopping after `timeout` without input
    async fn collect(&self, max_digits: usize, timeout: Duration) -> Result<String>;

    /// Feed digits detected in the media stream
    fn detected(&self, digits: &str);

    fn reset(&self);
}

/// Creates media resources for the pools
pub trait MediaResourceFactory: Send + Sync + fmt::Debug {
    fn create_rtp_channel(&self) -> Arc<dyn RtpChannel>;
    fn create_player(&self) -> Arc<dyn Player>;
    fn create_recorder(&self) -> Arc<dyn Recorder>;
    fn create_dtmf_detector(&self) -> Arc<dyn DtmfDetector>;
}
