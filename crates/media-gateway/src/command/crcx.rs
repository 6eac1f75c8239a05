//! CRCX: create a connection

use std::sync::Arc;

use async_trait::async_trait;
use rvoip_mgcp_core::builder::ResponseBuilder;
use rvoip_mgcp_core::{
    ConnectionMode, EndpointId, LocalConnectionOptions, MgcpRequest, MgcpResponse, ParameterName, ReturnCode,
    TransactionId, Verb, Wildcard,
};
use tracing::{debug, info, warn};

use super::{call_id, optional, parse_optional, require, CommandContext, MgcpCommand};
use crate::connection::{CallId, Connection, ConnectionKind};
use crate::endpoint::Endpoint;
use crate::errors::{GatewayError, Result};
use crate::registry::EndpointRegistry;

/// `$` resolutions retried when the chosen endpoint fills up concurrently
const ANY_ENDPOINT_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub struct CreateConnection {
    transaction_id: TransactionId,
    endpoint: EndpointId,
    call_id: CallId,
    mode: ConnectionMode,
    options: LocalConnectionOptions,
    second_endpoint: Option<EndpointId>,
    notified_entity: Option<String>,
    remote_sdp: Option<String>,
}

pub(super) fn build(request: MgcpRequest) -> Result<Box<dyn MgcpCommand>> {
    let call_id = call_id(&request)?;
    let mode = require(&request, ParameterName::ConnectionMode)?.parse::<ConnectionMode>()?;
    let options = parse_optional::<LocalConnectionOptions>(&request, ParameterName::LocalConnectionOptions)?
        .unwrap_or_default();
    let second_endpoint = parse_optional::<EndpointId>(&request, ParameterName::SecondEndpointId)?;
    let notified_entity = optional(&request, ParameterName::NotifiedEntity);

    if second_endpoint.is_some() && request.sdp.is_some() {
        return Err(GatewayError::Protocol {
            message: "CRCX cannot carry both Z2 and a remote session description".to_string(),
        });
    }

    Ok(Box::new(CreateConnection {
        transaction_id: request.transaction_id,
        endpoint: request.endpoint,
        call_id,
        mode,
        options,
        second_endpoint,
        notified_entity,
        remote_sdp: request.sdp,
    }))
}

/// Resolve the endpoint and create a connection on it
///
/// A `$` endpoint that fills up between resolution and creation is resolved
/// again. `except` is never chosen.
fn create_on(
    registry: &EndpointRegistry,
    id: &EndpointId,
    except: Option<&Arc<Endpoint>>,
    call_id: &CallId,
    kind: ConnectionKind,
) -> Result<(Arc<Endpoint>, Arc<Connection>)> {
    let mut attempt = 0;
    loop {
        let endpoint = match except {
            Some(other) => registry.resolve_one_except(id, other)?,
            None => registry.resolve_one(id)?,
        };
        match endpoint.create_connection(call_id.clone(), kind) {
            Ok(connection) => return Ok((endpoint, connection)),
            Err(GatewayError::TooManyConnections { .. })
                if id.wildcard() == Some(Wildcard::Any) && attempt + 1 < ANY_ENDPOINT_ATTEMPTS =>
            {
                attempt += 1;
                debug!("Endpoint {} filled up, resolving {} again", endpoint.id(), id);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delete connections created by a CRCX that did not complete
async fn discard(created: &[(Arc<Endpoint>, Arc<Connection>)]) {
    for (endpoint, connection) in created {
        if let Err(e) = endpoint.delete_connection(connection.id()).await {
            debug!("Connection {} already gone during cleanup: {}", connection.id(), e);
        }
    }
}

impl CreateConnection {
    async fn open_remote(&self, connection: &Connection) -> Result<Option<String>> {
        connection.set_options(self.options.clone());
        match &self.remote_sdp {
            Some(sdp) => {
                connection.open(Some(sdp.as_str())).await?;
            }
            None => connection.half_open().await?,
        }
        connection.update_mode(self.mode).await?;
        Ok(connection.local_description())
    }

    async fn open_local(&self, primary: &Arc<Connection>, secondary: &Arc<Connection>) -> Result<()> {
        Connection::pair(primary, secondary)?;
        primary.set_options(self.options.clone());
        primary.open(None).await?;
        secondary.open(None).await?;
        primary.update_mode(self.mode).await?;
        secondary.update_mode(ConnectionMode::SendRecv).await
    }

    async fn execute_remote(&self, context: &CommandContext) -> Result<MgcpResponse> {
        let (endpoint, connection) =
            create_on(&context.registry, &self.endpoint, None, &self.call_id, ConnectionKind::Remote)?;

        let local_sdp = match self.open_remote(&connection).await {
            Ok(sdp) => sdp,
            Err(e) => {
                warn!("CRCX {} on {} failed: {}", self.transaction_id, endpoint.id(), e);
                discard(&[(endpoint, connection)]).await;
                return Err(e);
            }
        };

        if let Some(entity) = &self.notified_entity {
            endpoint.set_notified_entity(entity.clone());
        }
        info!(
            "Created connection {} for call {} on {}",
            connection.id(),
            self.call_id,
            endpoint.id()
        );

        let mut response =
            ResponseBuilder::new(ReturnCode::TransactionExecuted, self.transaction_id).connection_id(connection.id().as_str());
        if self.endpoint.is_wildcard() {
            response = response.specific_endpoint(endpoint.id());
        }
        if let Some(sdp) = local_sdp {
            response = response.sdp(sdp);
        }
        Ok(response.build())
    }

    async fn execute_local(&self, context: &CommandContext, second: &EndpointId) -> Result<MgcpResponse> {
        let mut created = Vec::with_capacity(2);
        let result = self.create_pair(context, second, &mut created).await;
        if let Err(e) = result {
            warn!("CRCX {} local connection failed: {}", self.transaction_id, e);
            discard(&created).await;
            return Err(e);
        }

        let (endpoint, primary) = &created[0];
        let (second_endpoint, secondary) = &created[1];
        if let Some(entity) = &self.notified_entity {
            endpoint.set_notified_entity(entity.clone());
        }
        info!(
            "Bridged {} on {} with {} on {} for call {}",
            primary.id(),
            endpoint.id(),
            secondary.id(),
            second_endpoint.id(),
            self.call_id
        );

        let mut response = ResponseBuilder::new(ReturnCode::TransactionExecuted, self.transaction_id)
            .connection_id(primary.id().as_str())
            .parameter(ParameterName::SecondConnectionId, secondary.id().as_str());
        if self.endpoint.is_wildcard() {
            response = response.specific_endpoint(endpoint.id());
        }
        if second.is_wildcard() {
            response = response.parameter(ParameterName::SecondEndpointId, second_endpoint.id().to_string());
        }
        Ok(response.build())
    }

    async fn create_pair(
        &self,
        context: &CommandContext,
        second: &EndpointId,
        created: &mut Vec<(Arc<Endpoint>, Arc<Connection>)>,
    ) -> Result<()> {
        let first = create_on(&context.registry, &self.endpoint, None, &self.call_id, ConnectionKind::Local)?;
        let first_endpoint = Arc::clone(&first.0);
        created.push(first);
        // The pair always spans two endpoints
        created.push(create_on(
            &context.registry,
            second,
            Some(&first_endpoint),
            &self.call_id,
            ConnectionKind::Local,
        )?);
        self.open_local(&created[0].1, &created[1].1).await
    }
}

#[async_trait]
impl MgcpCommand for CreateConnection {
    fn verb(&self) -> Verb {
        Verb::Crcx
    }

    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    async fn execute(self: Box<Self>, context: Arc<CommandContext>) -> Result<MgcpResponse> {
        match &self.second_endpoint {
            Some(second) => self.execute_local(&context, second).await,
            None => self.execute_remote(&context).await,
        }
    }
}
