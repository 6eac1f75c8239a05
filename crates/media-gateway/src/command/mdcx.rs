//! MDCX: modify a connection

use std::sync::Arc;

use async_trait::async_trait;
use rvoip_mgcp_core::builder::ResponseBuilder;
use rvoip_mgcp_core::{
    ConnectionMode, EndpointId, LocalConnectionOptions, MgcpRequest, MgcpResponse, ParameterName, ReturnCode,
    TransactionId, Verb,
};
use tracing::info;

use super::{call_id, optional, parse_optional, require, require_exact, CommandContext, MgcpCommand};
use crate::connection::{CallId, Connection, ConnectionId, ConnectionState};
use crate::errors::{GatewayError, Result};

#[derive(Debug)]
pub struct ModifyConnection {
    transaction_id: TransactionId,
    endpoint: EndpointId,
    call_id: CallId,
    connection_id: ConnectionId,
    mode: Option<ConnectionMode>,
    options: Option<LocalConnectionOptions>,
    notified_entity: Option<String>,
    remote_sdp: Option<String>,
}

pub(super) fn build(request: MgcpRequest) -> Result<Box<dyn MgcpCommand>> {
    let call_id = call_id(&request)?;
    let connection_id = ConnectionId::new(require(&request, ParameterName::ConnectionId)?);
    Ok(Box::new(ModifyConnection {
        transaction_id: request.transaction_id,
        call_id,
        connection_id,
        mode: parse_optional(&request, ParameterName::ConnectionMode)?,
        options: parse_optional(&request, ParameterName::LocalConnectionOptions)?,
        notified_entity: optional(&request, ParameterName::NotifiedEntity),
        endpoint: request.endpoint,
        remote_sdp: request.sdp,
    }))
}

/// Check that `call_id` is the call `connection` belongs to
pub(super) fn check_call(connection: &Connection, call_id: &CallId) -> Result<()> {
    if connection.call_id() != call_id {
        return Err(GatewayError::CallIdMismatch {
            connection_id: connection.id().to_string(),
            expected: connection.call_id().to_string(),
            actual: call_id.to_string(),
        });
    }
    Ok(())
}

impl ModifyConnection {
    async fn apply_description(&self, connection: &Connection, sdp: &str) -> Result<()> {
        match connection.state() {
            ConnectionState::Null | ConnectionState::HalfOpen => {
                connection.open(Some(sdp)).await?;
            }
            _ => {
                connection.negotiate(sdp).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MgcpCommand for ModifyConnection {
    fn verb(&self) -> Verb {
        Verb::Mdcx
    }

    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    async fn execute(self: Box<Self>, context: Arc<CommandContext>) -> Result<MgcpResponse> {
        require_exact(&self.endpoint)?;
        let endpoint = context.registry.resolve_one(&self.endpoint)?;
        let connection = endpoint.connection(&self.connection_id)?;
        check_call(&connection, &self.call_id)?;

        if let Some(options) = &self.options {
            connection.set_options(options.clone());
        }
        if let Some(sdp) = &self.remote_sdp {
            self.apply_description(&connection, sdp).await?;
        }
        if let Some(mode) = self.mode {
            connection.update_mode(mode).await?;
        }
        if let Some(entity) = &self.notified_entity {
            endpoint.set_notified_entity(entity.clone());
        }
        info!(
            "Modified connection {} on {} (mode {})",
            connection.id(),
            endpoint.id(),
            connection.mode()
        );

        let mut response = ResponseBuilder::new(ReturnCode::TransactionExecuted, self.transaction_id);
        if self.remote_sdp.is_some() {
            if let Some(sdp) = connection.local_description() {
                response = response.sdp(sdp);
            }
        }
        Ok(response.build())
    }
}
