//! # NTFY delivery
//!
//! [`NotificationDispatcher`] turns endpoint [`Notification`]s into NTFY
//! requests and sends them to the notified entity. NTFY is a transaction the
//! gateway originates, so delivery is retried with exponential backoff until
//! the call agent answers with the same transaction id or the attempts run
//! out.
//!
//! Notified entities are `[name@]host[:port]`; the port defaults to the
//! call agent port 2727.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rvoip_mgcp_core::{MgcpRequest, MgcpResponse, ObservedEvent, ParameterName, TransactionId, Verb};
use rvoip_mgcp_transport::{Transport, DEFAULT_CALL_AGENT_PORT};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::endpoint::{Notification, NotificationSink, NotificationTarget};
use crate::errors::{GatewayError, Result};

/// Resolve a notification target to a socket address
pub async fn resolve_target(target: &NotificationTarget) -> Result<SocketAddr> {
    let entity = match target {
        NotificationTarget::Address(addr) => return Ok(*addr),
        NotificationTarget::Entity(entity) => entity,
    };

    let host = entity.rsplit_once('@').map(|(_, host)| host).unwrap_or(entity).trim();
    if host.is_empty() {
        return Err(GatewayError::invalid_parameter("N", format!("empty notified entity '{}'", entity)));
    }
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let has_port = host
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()));
    let lookup = if has_port {
        host.to_string()
    } else {
        format!("{}:{}", host.trim_matches(|c| c == '[' || c == ']'), DEFAULT_CALL_AGENT_PORT)
    };

    tokio::net::lookup_host(lookup.as_str())
        .await
        .map_err(|e| GatewayError::invalid_parameter("N", format!("cannot resolve '{}': {}", entity, e)))?
        .next()
        .ok_or_else(|| GatewayError::invalid_parameter("N", format!("no address for '{}'", entity)))
}

struct DispatcherInner {
    transport: Arc<dyn Transport>,
    config: NotificationConfig,
    next_transaction: AtomicU32,
    pending: DashMap<TransactionId, oneshot::Sender<MgcpResponse>>,
}

/// Sends NTFY requests and matches their responses
#[derive(Clone)]
pub struct NotificationDispatcher {
    inner: Arc<DispatcherInner>,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn Transport>, config: NotificationConfig) -> Self {
        // Start somewhere random so restarts do not reuse recent ids
        let seed = rand::random::<u32>() % (TransactionId::MAX / 2) + 1;
        Self {
            inner: Arc::new(DispatcherInner {
                transport,
                config,
                next_transaction: AtomicU32::new(seed),
                pending: DashMap::new(),
            }),
        }
    }

    /// Allocate the transaction id for the next NTFY
    pub fn next_transaction_id(&self) -> TransactionId {
        let value = self
            .inner
            .next_transaction
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(TransactionId(v).next().0))
            .unwrap_or(1);
        TransactionId(value)
    }

    /// NTFY request carrying `notification`
    pub fn build_request(&self, notification: &Notification, transaction_id: TransactionId) -> MgcpRequest {
        let mut request = MgcpRequest::new(Verb::Ntfy, transaction_id, notification.endpoint.clone());
        if let NotificationTarget::Entity(entity) = &notification.target {
            request.parameters.insert(ParameterName::NotifiedEntity, entity.clone());
        }
        request
            .parameters
            .insert(ParameterName::RequestIdentifier, notification.request_id.clone());
        request.parameters.insert(
            ParameterName::ObservedEvents,
            ObservedEvent::render_list(&notification.observed),
        );
        request
    }

    /// Send a notification and wait for the call agent's response
    pub async fn send(&self, notification: Notification) -> Result<MgcpResponse> {
        let destination = resolve_target(&notification.target).await?;
        let transaction_id = self.next_transaction_id();
        let request = self.build_request(&notification, transaction_id);

        let (tx, mut rx) = oneshot::channel();
        self.inner.pending.insert(transaction_id, tx);
        let result = self.transmit(request, destination, &mut rx).await;
        self.inner.pending.remove(&transaction_id);
        result
    }

    async fn transmit(
        &self,
        request: MgcpRequest,
        destination: SocketAddr,
        rx: &mut oneshot::Receiver<MgcpResponse>,
    ) -> Result<MgcpResponse> {
        let transaction_id = request.transaction_id;
        let config = &self.inner.config;

        for attempt in 0..config.max_attempts {
            if attempt > 0 {
                debug!("Retransmitting NTFY {} to {} (attempt {})", transaction_id, destination, attempt + 1);
            }
            if let Err(e) = self.inner.transport.send_message(request.clone().into(), destination).await {
                warn!("Failed to send NTFY {} to {}: {}", transaction_id, destination, e);
            }

            match tokio::time::timeout(config.retransmit_delay(attempt), &mut *rx).await {
                Ok(Ok(response)) => {
                    info!("NTFY {} answered with {}", transaction_id, response.code);
                    return Ok(response);
                }
                Ok(Err(_)) => {
                    return Err(GatewayError::internal(format!("NTFY {} abandoned", transaction_id)));
                }
                Err(_) => continue,
            }
        }

        warn!(
            "NTFY {} to {} unanswered after {} attempts",
            transaction_id, destination, config.max_attempts
        );
        Err(GatewayError::Transport {
            message: format!("no response to NTFY {} from {}", transaction_id, destination),
        })
    }

    /// Complete a pending NTFY; returns whether the response was expected
    pub fn on_response(&self, response: MgcpResponse) -> bool {
        match self.inner.pending.remove(&response.transaction_id) {
            Some((_, tx)) => tx.send(response).is_ok(),
            None => {
                debug!("Ignoring response {} for no pending NTFY", response.transaction_id);
                false
            }
        }
    }

    /// NTFY transactions waiting for a response
    pub fn pending(&self) -> usize {
        self.inner.pending.len()
    }
}

impl NotificationSink for NotificationDispatcher {
    fn submit(&self, notification: Notification) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let endpoint = notification.endpoint.clone();
            if let Err(e) = dispatcher.send(notification).await {
                warn!("Notification from {} not delivered: {}", endpoint, e);
            }
        });
    }
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("transport", &self.inner.transport)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rvoip_mgcp_core::{EndpointId, MgcpMessage, ReturnCode};

    use crate::test_support::RecordingTransport;

    fn notification(target: NotificationTarget) -> Notification {
        Notification {
            endpoint: EndpointId::new("ivr/1", "gw"),
            target,
            request_id: "0A3F".to_string(),
            observed: vec![ObservedEvent::with_parameters(
                "AU/oc".parse().unwrap(),
                "rc=100 dc=12",
            )],
        }
    }

    #[tokio::test]
    async fn test_resolve_targets() {
        let addr: SocketAddr = "10.1.1.1:3000".parse().unwrap();
        assert_eq!(resolve_target(&NotificationTarget::Address(addr)).await.unwrap(), addr);
        assert_eq!(
            resolve_target(&NotificationTarget::Entity("ca@127.0.0.1".to_string()))
                .await
                .unwrap(),
            "127.0.0.1:2727".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_target(&NotificationTarget::Entity("127.0.0.1:5000".to_string()))
                .await
                .unwrap()
                .port(),
            5000
        );
        assert!(resolve_target(&NotificationTarget::Entity("ca@".to_string())).await.is_err());
    }

    #[test]
    fn test_ntfy_request_shape() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = NotificationDispatcher::new(transport, NotificationConfig::default());
        let request = dispatcher.build_request(
            &notification(NotificationTarget::Entity("ca@127.0.0.1:2727".to_string())),
            TransactionId(12),
        );
        let wire = request.to_string();
        assert!(wire.starts_with("NTFY 12 ivr/1@gw MGCP 1.0\r\n"));
        assert!(wire.contains("N: ca@127.0.0.1:2727\r\n"));
        assert!(wire.contains("X: 0A3F\r\n"));
        assert!(wire.contains("O: AU/oc(rc=100 dc=12)"));
    }

    #[test]
    fn test_transaction_ids_advance() {
        let dispatcher = NotificationDispatcher::new(Arc::new(RecordingTransport::new()), NotificationConfig::default());
        let a = dispatcher.next_transaction_id();
        let b = dispatcher.next_transaction_id();
        assert_eq!(a.next(), b);
        assert!(TransactionId::new(a.value()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retransmits_until_answered() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = NotificationDispatcher::new(transport.clone(), NotificationConfig::default());
        let target = NotificationTarget::Address("127.0.0.1:2727".parse().unwrap());

        let sender = dispatcher.clone();
        let task = tokio::spawn(async move { sender.send(notification(target)).await });

        // 200 ms then 400 ms without an answer
        tokio::time::sleep(Duration::from_millis(650)).await;
        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        let transaction_id = sent[0].0.transaction_id();
        assert!(sent.iter().all(|(m, _)| m.transaction_id() == transaction_id));

        assert!(dispatcher.on_response(MgcpResponse::new(ReturnCode::TransactionExecuted, transaction_id)));
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.code, ReturnCode::TransactionExecuted);
        assert_eq!(dispatcher.pending(), 0);
        assert!(matches!(sent[0].0, MgcpMessage::Request(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let transport = Arc::new(RecordingTransport::new());
        let config = NotificationConfig {
            max_attempts: 2,
            ..Default::default()
        };
        let dispatcher = NotificationDispatcher::new(transport.clone(), config);
        let result = dispatcher
            .send(notification(NotificationTarget::Address("127.0.0.1:2727".parse().unwrap())))
            .await;
        assert!(matches!(result, Err(GatewayError::Transport { .. })));
        assert_eq!(transport.sent().len(), 2);
        assert!(!dispatcher.on_response(MgcpResponse::new(ReturnCode::TransactionExecuted, TransactionId(1))));
    }
}
