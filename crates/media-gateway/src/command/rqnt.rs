//! RQNT: request notification of events and run signals

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rvoip_mgcp_core::{
    EndpointId, MgcpRequest, MgcpResponse, ParameterName, RequestedEvent, ReturnCode, SignalRequest, TransactionId,
    Verb,
};
use tracing::{debug, info};

use super::{optional, require, require_exact, CommandContext, MgcpCommand};
use crate::connection::{Connection, ConnectionId};
use crate::endpoint::NotificationRequest as EndpointRequest;
use crate::errors::{GatewayError, Result};
use crate::packages::{EventScope, PackageRegistry};

#[derive(Debug)]
pub struct RequestNotification {
    transaction_id: TransactionId,
    endpoint: EndpointId,
    request_id: String,
    notified_entity: Option<String>,
    events: Vec<RequestedEvent>,
    signals: Vec<SignalRequest>,
}

pub(super) fn build(request: MgcpRequest) -> Result<Box<dyn MgcpCommand>> {
    let request_id = require(&request, ParameterName::RequestIdentifier)?;
    let events = optional(&request, ParameterName::RequestedEvents)
        .map(|raw| RequestedEvent::parse_list(&raw))
        .transpose()?
        .unwrap_or_default();
    let signals = optional(&request, ParameterName::SignalRequests)
        .map(|raw| SignalRequest::parse_list(&raw))
        .transpose()?
        .unwrap_or_default();

    Ok(Box::new(RequestNotification {
        transaction_id: request.transaction_id,
        request_id,
        notified_entity: optional(&request, ParameterName::NotifiedEntity),
        events,
        signals,
        endpoint: request.endpoint,
    }))
}

/// Fill in the package of an unpackaged event and report where it is detected
fn qualify(packages: &PackageRegistry, requested: &RequestedEvent) -> Result<(RequestedEvent, EventScope)> {
    let definition = packages.event_details(&requested.event)?;
    let mut requested = requested.clone();
    if requested.event.package.is_none() {
        requested.event.package = packages
            .packages()
            .iter()
            .find(|p| p.event(&requested.event.name).is_some())
            .map(|p| p.name.to_string());
    }
    Ok((requested, definition.scope))
}

/// Spread connection-scoped events over the connections that detect them
///
/// An event naming a connection must be detectable there; an unscoped event
/// goes to every connection able to detect it.
fn assign(
    connections: &[Arc<Connection>],
    requested: &RequestedEvent,
    assignments: &mut HashMap<ConnectionId, Vec<RequestedEvent>>,
) -> Result<()> {
    match requested.event.connection.as_deref() {
        None | Some("$") | Some("*") => {
            for connection in connections.iter().filter(|c| c.supports_event(&requested.event)) {
                assignments
                    .entry(connection.id().clone())
                    .or_default()
                    .push(requested.clone());
            }
        }
        Some(id) => {
            let connection = connections
                .iter()
                .find(|c| c.id().as_str().eq_ignore_ascii_case(id))
                .ok_or_else(|| GatewayError::ConnectionNotFound {
                    connection_id: id.to_string(),
                })?;
            if !connection.supports_event(&requested.event) {
                return Err(GatewayError::UnsupportedEvent {
                    event: requested.event.to_string(),
                });
            }
            assignments
                .entry(connection.id().clone())
                .or_default()
                .push(requested.clone());
        }
    }
    Ok(())
}

/// Replace the event lists of `connections`
///
/// Runs after every check has passed. A connection deleted meanwhile is
/// skipped, as it no longer belongs to the endpoint.
fn apply(connections: &[Arc<Connection>], mut assignments: HashMap<ConnectionId, Vec<RequestedEvent>>) {
    for connection in connections {
        let wanted = assignments.remove(connection.id()).unwrap_or_default();
        if let Err(e) = connection.register_events(wanted) {
            debug!("Skipping events for connection {}: {}", connection.id(), e);
        }
    }
}

#[async_trait]
impl MgcpCommand for RequestNotification {
    fn verb(&self) -> Verb {
        Verb::Rqnt
    }

    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    async fn execute(self: Box<Self>, context: Arc<CommandContext>) -> Result<MgcpResponse> {
        let this = *self;
        require_exact(&this.endpoint)?;
        let endpoint = context.registry.resolve_one(&this.endpoint)?;
        let connections: Vec<_> = endpoint
            .connections()
            .into_iter()
            .filter(|c| !c.state().is_closed())
            .collect();

        let mut events = Vec::with_capacity(this.events.len());
        let mut assignments = HashMap::new();
        for requested in &this.events {
            let (requested, scope) = qualify(&context.packages, requested)?;
            if scope == EventScope::Connection {
                assign(&connections, &requested, &mut assignments)?;
            }
            events.push(requested);
        }

        // Leases are taken before any state changes
        let prepared = context.signals.prepare(&this.signals)?;

        apply(&connections, assignments);
        info!(
            "RQNT X:{} on {}: {} event(s), {} signal(s)",
            this.request_id,
            endpoint.id(),
            events.len(),
            prepared.as_ref().map_or(0, |p| p.len())
        );
        endpoint.request_notification(
            EndpointRequest {
                request_id: this.request_id,
                notified_entity: this.notified_entity,
                events,
                signals: this.signals,
            },
            prepared,
        );

        Ok(MgcpResponse::new(ReturnCode::TransactionExecuted, this.transaction_id))
    }
}
