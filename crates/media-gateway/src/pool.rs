//! # Resource Pool
//!
//! Bounded pools of media resources shared by every endpoint of the gateway.
//!
//! - [`ResourcePool::acquire`] never waits: it hands out a free object, creates
//!   one while below capacity, or returns `None`. Callers report exhaustion as
//!   a normal error.
//! - [`ResourcePool::release`] is idempotent. Objects are tracked by identity,
//!   so releasing something twice, or releasing an object the pool never
//!   handed out, is a no-op.
//! - [`ResourcePool::lease`] wraps an acquired object in a [`Lease`] that
//!   returns it on drop, for resources held by a task that may be cancelled.

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::PoolConfig;
use crate::media::{DtmfDetector, MediaResourceFactory, Player, Recorder, RtpChannel};

type Factory<T> = Box<dyn Fn() -> Arc<T> + Send + Sync>;

struct PoolState<T: ?Sized> {
    free: Vec<Arc<T>>,
    checked_out: HashSet<usize>,
    created: usize,
}

/// A bounded pool of shared objects
pub struct ResourcePool<T: ?Sized> {
    name: String,
    capacity: usize,
    factory: Factory<T>,
    state: Mutex<PoolState<T>>,
}

fn identity<T: ?Sized>(object: &Arc<T>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

impl<T: ?Sized> ResourcePool<T> {
    /// Create an empty pool that builds up to `capacity` objects on demand
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        factory: impl Fn() -> Arc<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            capacity,
            factory: Box::new(factory),
            state: Mutex::new(PoolState {
                free: Vec::new(),
                checked_out: HashSet::new(),
                created: 0,
            }),
        }
    }

    /// Pool name, used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take an object, or `None` when the pool is exhausted
    pub fn acquire(&self) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        let object = match state.free.pop() {
            Some(object) => object,
            None if state.created < self.capacity => {
                state.created += 1;
                (self.factory)()
            }
            None => {
                debug!("Pool {} exhausted ({} in use)", self.name, state.checked_out.len());
                return None;
            }
        };
        state.checked_out.insert(identity(&object));
        trace!("Pool {}: acquired, {} in use", self.name, state.checked_out.len());
        Some(object)
    }

    /// Return an object; returns `false` if it was not checked out
    pub fn release(&self, object: &Arc<T>) -> bool {
        let mut state = self.state.lock();
        if !state.checked_out.remove(&identity(object)) {
            trace!("Pool {}: ignoring release of an object not in use", self.name);
            return false;
        }
        state.free.push(Arc::clone(object));
        trace!("Pool {}: released, {} in use", self.name, state.checked_out.len());
        true
    }

    /// Acquire an object that goes back to the pool when the lease is dropped
    pub fn lease(self: &Arc<Self>) -> Option<Lease<T>> {
        self.acquire().map(|object| Lease {
            pool: Arc::clone(self),
            object,
        })
    }

    /// Objects that can still be acquired
    pub fn available(&self) -> usize {
        let state = self.state.lock();
        state.free.len() + (self.capacity - state.created)
    }

    /// Objects currently checked out
    pub fn in_use(&self) -> usize {
        self.state.lock().checked_out.len()
    }

    /// Maximum number of objects
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: ?Sized> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// An object checked out of a [`ResourcePool`], released on drop
pub struct Lease<T: ?Sized> {
    pool: Arc<ResourcePool<T>>,
    object: Arc<T>,
}

impl<T: ?Sized> Lease<T> {
    /// Shared handle to the leased object
    pub fn object(&self) -> &Arc<T> {
        &self.object
    }
}

impl<T: ?Sized> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: ?Sized> Drop for Lease<T> {
    fn drop(&mut self) {
        self.pool.release(&self.object);
    }
}

impl<T: ?Sized> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lease({})", self.pool.name)
    }
}

/// The gateway-wide media resource pools
#[derive(Debug, Clone)]
pub struct MediaPools {
    pub rtp_channels: Arc<ResourcePool<dyn RtpChannel>>,
    pub players: Arc<ResourcePool<dyn Player>>,
    pub recorders: Arc<ResourcePool<dyn Recorder>>,
    pub dtmf_detectors: Arc<ResourcePool<dyn DtmfDetector>>,
}

impl MediaPools {
    /// Build the pools, creating resources lazily through `factory`
    pub fn new(config: &PoolConfig, factory: Arc<dyn MediaResourceFactory>) -> Self {
        let rtp_factory = Arc::clone(&factory);
        let player_factory = Arc::clone(&factory);
        let recorder_factory = Arc::clone(&factory);
        let detector_factory = factory;

        Self {
            rtp_channels: Arc::new(ResourcePool::new("rtp", config.rtp_channels, move || {
                rtp_factory.create_rtp_channel()
            })),
            players: Arc::new(ResourcePool::new("player", config.players, move || {
                player_factory.create_player()
            })),
            recorders: Arc::new(ResourcePool::new("recorder", config.recorders, move || {
                recorder_factory.create_recorder()
            })),
            dtmf_detectors: Arc::new(ResourcePool::new("dtmf", config.dtmf_detectors, move || {
                detector_factory.create_dtmf_detector()
            })),
        }
    }
}
