//! Fan-out of MGCP traffic to interested endpoints

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use rvoip_mgcp_core::MgcpMessage;

/// Direction of an observed message relative to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

/// Sees every MGCP message the gateway sends or receives
pub trait MgcpMessageObserver: Send + Sync {
    fn on_message(&self, message: &MgcpMessage, direction: MessageDirection, peer: SocketAddr);
}

/// Set of observers that can change while messages are delivered
///
/// Delivery iterates over a snapshot, so observers may add or remove
/// observers (including themselves) from inside `on_message`.
#[derive(Default)]
pub struct ObserverHub {
    observers: RwLock<Vec<Arc<dyn MgcpMessageObserver>>>,
}

fn same_observer(a: &Arc<dyn MgcpMessageObserver>, b: &Arc<dyn MgcpMessageObserver>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer; adding the same observer twice has no effect
    pub fn add(&self, observer: Arc<dyn MgcpMessageObserver>) {
        let mut observers = self.observers.write();
        if !observers.iter().any(|o| same_observer(o, &observer)) {
            observers.push(observer);
        }
    }

    /// Remove an observer; returns whether it was present
    pub fn remove(&self, observer: &Arc<dyn MgcpMessageObserver>) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|o| !same_observer(o, observer));
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    pub fn notify(&self, message: &MgcpMessage, direction: MessageDirection, peer: SocketAddr) {
        let snapshot = self.observers.read().clone();
        for observer in snapshot {
            observer.on_message(message, direction, peer);
        }
    }
}

impl fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObserverHub({} observers)", self.len())
    }
}
