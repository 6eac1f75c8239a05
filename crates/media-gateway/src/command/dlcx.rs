//! DLCX: delete one connection, the connections of a call, or all of them

use std::sync::Arc;

use async_trait::async_trait;
use rvoip_mgcp_core::builder::ResponseBuilder;
use rvoip_mgcp_core::{
    EndpointId, MgcpRequest, MgcpResponse, ParameterName, ReturnCode, TransactionId, Verb, Wildcard,
};
use tracing::info;

use super::mdcx::check_call;
use super::{optional, require_exact, CommandContext, MgcpCommand};
use crate::connection::{CallId, ConnectionId};
use crate::errors::{GatewayError, Result};

#[derive(Debug)]
enum Scope {
    Connection(ConnectionId, Option<CallId>),
    Call(CallId),
    Endpoint,
}

#[derive(Debug)]
pub struct DeleteConnection {
    transaction_id: TransactionId,
    endpoint: EndpointId,
    scope: Scope,
}

pub(super) fn build(request: MgcpRequest) -> Result<Box<dyn MgcpCommand>> {
    let call_id = optional(&request, ParameterName::CallId).map(CallId::new);
    let connection_id = optional(&request, ParameterName::ConnectionId).map(ConnectionId::new);
    let scope = match (connection_id, call_id) {
        (Some(connection_id), call_id) => Scope::Connection(connection_id, call_id),
        (None, Some(call_id)) => Scope::Call(call_id),
        (None, None) => Scope::Endpoint,
    };
    Ok(Box::new(DeleteConnection {
        transaction_id: request.transaction_id,
        endpoint: request.endpoint,
        scope,
    }))
}

#[async_trait]
impl MgcpCommand for DeleteConnection {
    fn verb(&self) -> Verb {
        Verb::Dlcx
    }

    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    async fn execute(self: Box<Self>, context: Arc<CommandContext>) -> Result<MgcpResponse> {
        let response = ResponseBuilder::new(ReturnCode::ConnectionDeleted, self.transaction_id);
        if self.endpoint.wildcard() == Some(Wildcard::Any) {
            return Err(GatewayError::WildcardTooComplicated {
                endpoint: self.endpoint.to_string(),
            });
        }

        match &self.scope {
            Scope::Connection(connection_id, call_id) => {
                require_exact(&self.endpoint)?;
                let endpoint = context.registry.resolve_one(&self.endpoint)?;
                if let Some(call_id) = call_id {
                    let connection = endpoint.connection(connection_id)?;
                    check_call(&connection, call_id)?;
                }
                let connection = endpoint.delete_connection(connection_id).await?;
                let statistics = connection.statistics();
                info!("Deleted connection {} on {}", connection_id, endpoint.id());
                Ok(response
                    .parameter(ParameterName::ConnectionParameters, statistics.to_parameter_value())
                    .build())
            }
            Scope::Call(call_id) => {
                let mut deleted = 0;
                for endpoint in context.registry.resolve(&self.endpoint)? {
                    deleted += endpoint.delete_call_connections(call_id).await.len();
                }
                info!("Deleted {} connection(s) of call {} on {}", deleted, call_id, self.endpoint);
                Ok(response.build())
            }
            Scope::Endpoint => {
                let mut deleted = 0;
                for endpoint in context.registry.resolve(&self.endpoint)? {
                    deleted += endpoint.delete_all_connections().await.len();
                }
                info!("Deleted {} connection(s) on {}", deleted, self.endpoint);
                Ok(response.build())
            }
        }
    }
}
