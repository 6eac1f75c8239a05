//! AUCX and AUEP: read-only audits

use std::sync::Arc;

use async_trait::async_trait;
use rvoip_mgcp_core::builder::ResponseBuilder;
use rvoip_mgcp_core::{
    EndpointId, MgcpRequest, MgcpResponse, ObservedEvent, ParameterName, ReturnCode, TransactionId, Verb, Wildcard,
};
use tracing::debug;

use super::{require, require_exact, requested_info, CommandContext, MgcpCommand};
use crate::connection::ConnectionId;
use crate::endpoint::Endpoint;
use crate::errors::{GatewayError, Result};
use crate::packages::PackageRegistry;

const SUPPORTED_MODES: &str = "sendonly;recvonly;sendrecv;inactive;confrnce;loopback;netwloop;netwtest";

/// Capabilities reported for `F: A`
fn capabilities(packages: &PackageRegistry) -> String {
    let names: Vec<&str> = packages.packages().iter().map(|p| p.name).collect();
    format!(
        "a:PCMU;PCMA, p:20, e:on, s:off, m:{}, v:{}",
        SUPPORTED_MODES,
        names.join(";")
    )
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

#[derive(Debug)]
pub struct AuditConnection {
    transaction_id: TransactionId,
    endpoint: EndpointId,
    connection_id: ConnectionId,
    info: Vec<ParameterName>,
}

pub(super) fn build_aucx(request: MgcpRequest) -> Result<Box<dyn MgcpCommand>> {
    let connection_id = ConnectionId::new(require(&request, ParameterName::ConnectionId)?);
    Ok(Box::new(AuditConnection {
        transaction_id: request.transaction_id,
        info: requested_info(&request)?,
        endpoint: request.endpoint,
        connection_id,
    }))
}

#[async_trait]
impl MgcpCommand for AuditConnection {
    fn verb(&self) -> Verb {
        Verb::Aucx
    }

    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    async fn execute(self: Box<Self>, context: Arc<CommandContext>) -> Result<MgcpResponse> {
        require_exact(&self.endpoint)?;
        let endpoint = context.registry.resolve_one(&self.endpoint)?;
        let connection = endpoint.connection(&self.connection_id)?;

        let mut response = ResponseBuilder::new(ReturnCode::TransactionExecuted, self.transaction_id);
        let mut descriptors = Vec::new();
        for name in &self.info {
            response = match name {
                ParameterName::CallId => response.parameter(name.clone(), connection.call_id().to_string()),
                ParameterName::NotifiedEntity => match endpoint.notification_state().notified_entity {
                    Some(entity) => response.parameter(name.clone(), entity),
                    None => response,
                },
                ParameterName::LocalConnectionOptions => {
                    response.parameter(name.clone(), connection.options().to_string())
                }
                ParameterName::ConnectionMode => response.parameter(name.clone(), connection.mode().to_string()),
                ParameterName::ConnectionParameters => {
                    response.parameter(name.clone(), connection.statistics().to_parameter_value())
                }
                ParameterName::LocalConnectionDescriptor => {
                    descriptors.extend(connection.local_description());
                    response
                }
                ParameterName::RemoteConnectionDescriptor => {
                    descriptors.extend(connection.remote_description());
                    response
                }
                other => {
                    debug!("AUCX ignoring requested info {}", other);
                    response
                }
            };
        }

        // LC and RC travel as session descriptions separated by an empty line
        if !descriptors.is_empty() {
            let body: Vec<&str> = descriptors.iter().map(|d| d.trim_end()).collect();
            response = response.sdp(body.join("\r\n\r\n"));
        }
        Ok(response.build())
    }
}

#[derive(Debug)]
pub struct AuditEndpoint {
    transaction_id: TransactionId,
    endpoint: EndpointId,
    info: Vec<ParameterName>,
}

pub(super) fn build_auep(request: MgcpRequest) -> Result<Box<dyn MgcpCommand>> {
    Ok(Box::new(AuditEndpoint {
        transaction_id: request.transaction_id,
        info: requested_info(&request)?,
        endpoint: request.endpoint,
    }))
}

impl AuditEndpoint {
    fn audit(&self, mut response: ResponseBuilder, endpoint: &Endpoint, packages: &PackageRegistry) -> ResponseBuilder {
        let state = endpoint.notification_state();
        for name in &self.info {
            response = match name {
                ParameterName::ConnectionId => endpoint
                    .connection_ids()
                    .iter()
                    .fold(response, |r, id| r.append(ParameterName::ConnectionId, id.as_str())),
                ParameterName::NotifiedEntity => match &state.notified_entity {
                    Some(entity) => response.parameter(name.clone(), entity.clone()),
                    None => response,
                },
                ParameterName::RequestIdentifier => match &state.request_id {
                    Some(id) => response.parameter(name.clone(), id.clone()),
                    None => response,
                },
                ParameterName::RequestedEvents => response.parameter(name.clone(), join(&state.requested_events)),
                ParameterName::SignalRequests => response.parameter(name.clone(), join(&state.signals)),
                ParameterName::ObservedEvents => {
                    response.parameter(name.clone(), ObservedEvent::render_list(&state.observed))
                }
                ParameterName::EventStates => response.parameter(name.clone(), ""),
                ParameterName::Capabilities => response.parameter(name.clone(), capabilities(packages)),
                other => {
                    debug!("AUEP ignoring requested info {}", other);
                    response
                }
            };
        }
        response
    }
}

#[async_trait]
impl MgcpCommand for AuditEndpoint {
    fn verb(&self) -> Verb {
        Verb::Auep
    }

    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    async fn execute(self: Box<Self>, context: Arc<CommandContext>) -> Result<MgcpResponse> {
        let response = ResponseBuilder::new(ReturnCode::TransactionExecuted, self.transaction_id);
        match self.endpoint.wildcard() {
            Some(Wildcard::All) => {
                let endpoints = context.registry.resolve(&self.endpoint)?;
                Ok(endpoints
                    .iter()
                    .fold(response, |r, e| r.append(ParameterName::SpecificEndpointId, e.id().to_string()))
                    .build())
            }
            Some(Wildcard::Any) => Err(GatewayError::WildcardTooComplicated {
                endpoint: self.endpoint.to_string(),
            }),
            None => {
                let endpoint = context.registry.resolve_one(&self.endpoint)?;
                Ok(self.audit(response, &endpoint, &context.packages).build())
            }
        }
    }
}
