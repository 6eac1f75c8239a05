//! # Command Dispatch
//!
//! Every MGCP verb the gateway executes is a short-lived [`MgcpCommand`]
//! built from the request parameters. Construction parses and validates the
//! parameters, so malformed requests are answered before anything is touched;
//! [`MgcpCommand::execute`] then drives the registry, endpoints and
//! connections and produces the final response.
//!
//! Verbs map to constructors through a static table:
//!
//! | verb | command |
//! |------|---------|
//! | CRCX | [`CreateConnection`] |
//! | MDCX | [`ModifyConnection`] |
//! | DLCX | [`DeleteConnection`] |
//! | RQNT | [`RequestNotification`] |
//! | AUCX | [`AuditConnection`] |
//! | AUEP | [`AuditEndpoint`] |
//!
//! ```rust
//! use rvoip_mgcp_core::{EndpointId, MgcpRequest, TransactionId, Verb};
//! use rvoip_media_gateway::command::CommandProvider;
//!
//! let request = MgcpRequest::new(Verb::Rsip, TransactionId(7), EndpointId::new("ivr/1", "gw"));
//! assert!(!CommandProvider::supports(Verb::Rsip));
//! assert!(CommandProvider::provide(request).is_err());
//! ```

mod audit;
mod crcx;
mod dlcx;
mod mdcx;
mod rqnt;

pub use audit::{AuditConnection, AuditEndpoint};
pub use crcx::CreateConnection;
pub use dlcx::DeleteConnection;
pub use mdcx::ModifyConnection;
pub use rqnt::RequestNotification;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rvoip_mgcp_core::{EndpointId, MgcpRequest, MgcpResponse, ParameterName, TransactionId, Verb};

use crate::connection::CallId;
use crate::errors::{GatewayError, Result};
use crate::packages::PackageRegistry;
use crate::registry::EndpointRegistry;
use crate::signal::SignalExecutor;

/// Services a command executes against
#[derive(Debug)]
pub struct CommandContext {
    pub registry: Arc<EndpointRegistry>,
    pub packages: PackageRegistry,
    pub signals: SignalExecutor,
}

impl CommandContext {
    pub fn new(registry: Arc<EndpointRegistry>, packages: PackageRegistry, signals: SignalExecutor) -> Self {
        Self {
            registry,
            packages,
            signals,
        }
    }
}

/// One MGCP command, ready to run
#[async_trait]
pub trait MgcpCommand: Send + fmt::Debug {
    fn verb(&self) -> Verb;

    fn transaction_id(&self) -> TransactionId;

    /// Run the command and produce the final response
    async fn execute(self: Box<Self>, context: Arc<CommandContext>) -> Result<MgcpResponse>;
}

/// Builds a command from a request
pub type CommandConstructor = fn(MgcpRequest) -> Result<Box<dyn MgcpCommand>>;

static COMMANDS: &[(Verb, CommandConstructor)] = &[
    (Verb::Crcx, crcx::build),
    (Verb::Mdcx, mdcx::build),
    (Verb::Dlcx, dlcx::build),
    (Verb::Rqnt, rqnt::build),
    (Verb::Aucx, audit::build_aucx),
    (Verb::Auep, audit::build_auep),
];

/// Maps verbs to command constructors
pub struct CommandProvider;

impl CommandProvider {
    /// Verbs with a registered command
    pub fn verbs() -> impl Iterator<Item = Verb> {
        COMMANDS.iter().map(|(verb, _)| *verb)
    }

    pub fn supports(verb: Verb) -> bool {
        COMMANDS.iter().any(|(v, _)| *v == verb)
    }

    /// Build the command for `request`
    pub fn provide(request: MgcpRequest) -> Result<Box<dyn MgcpCommand>> {
        let verb = request.verb;
        let (_, constructor) = COMMANDS
            .iter()
            .find(|(v, _)| *v == verb)
            .ok_or(GatewayError::UnsupportedCommand { verb })?;
        constructor(request)
    }
}

fn require(request: &MgcpRequest, name: ParameterName) -> Result<String> {
    request
        .parameter(&name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::missing_parameter(name.as_str()))
}

fn optional(request: &MgcpRequest, name: ParameterName) -> Option<String> {
    request
        .parameter(&name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_optional<T>(request: &MgcpRequest, name: ParameterName) -> Result<Option<T>>
where
    T: FromStr<Err = rvoip_mgcp_core::Error>,
{
    optional(request, name).map(|raw| raw.parse::<T>()).transpose().map_err(Into::into)
}

fn call_id(request: &MgcpRequest) -> Result<CallId> {
    require(request, ParameterName::CallId).map(CallId::new)
}

/// `F:` list of parameter codes
fn requested_info(request: &MgcpRequest) -> Result<Vec<ParameterName>> {
    optional(request, ParameterName::RequestedInfo)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(|code| code.parse::<ParameterName>().map_err(GatewayError::from))
                .collect()
        })
        .unwrap_or_else(|| Ok(Vec::new()))
}

/// Commands that address a single endpoint reject both wildcards
fn require_exact(endpoint: &EndpointId) -> Result<()> {
    if endpoint.is_wildcard() {
        return Err(GatewayError::WildcardTooComplicated {
            endpoint: endpoint.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvoip_mgcp_core::builder::RequestBuilder;

    fn request(verb: Verb) -> RequestBuilder {
        RequestBuilder::new(verb, TransactionId(100), EndpointId::new("ivr/1", "gw"))
    }

    #[test]
    fn test_table_covers_executed_verbs() {
        let verbs: Vec<Verb> = CommandProvider::verbs().collect();
        assert_eq!(
            verbs,
            vec![Verb::Crcx, Verb::Mdcx, Verb::Dlcx, Verb::Rqnt, Verb::Aucx, Verb::Auep]
        );
        assert!(!CommandProvider::supports(Verb::Epcf));
        assert!(!CommandProvider::supports(Verb::Ntfy));
    }

    #[test]
    fn test_unsupported_verb() {
        let err = CommandProvider::provide(request(Verb::Epcf).build()).unwrap_err();
        assert_eq!(err, GatewayError::UnsupportedCommand { verb: Verb::Epcf });
        assert_eq!(err.return_code().as_u16(), 504);
    }

    #[test]
    fn test_provide_builds_matching_command() {
        let command = CommandProvider::provide(request(Verb::Auep).build()).unwrap();
        assert_eq!(command.verb(), Verb::Auep);
        assert_eq!(command.transaction_id(), TransactionId(100));
    }

    #[test]
    fn test_missing_parameters_fail_construction() {
        let err = CommandProvider::provide(request(Verb::Crcx).mode(rvoip_mgcp_core::ConnectionMode::RecvOnly).build())
            .unwrap_err();
        assert_eq!(err, GatewayError::missing_parameter("C"));

        let err = CommandProvider::provide(request(Verb::Mdcx).call_id("A1").build()).unwrap_err();
        assert_eq!(err, GatewayError::missing_parameter("I"));

        let err = CommandProvider::provide(request(Verb::Rqnt).build()).unwrap_err();
        assert_eq!(err, GatewayError::missing_parameter("X"));
    }

    #[test]
    fn test_requested_info_parsing() {
        let req = request(Verb::Aucx)
            .parameter(ParameterName::RequestedInfo, "C, M,lc")
            .build();
        assert_eq!(
            requested_info(&req).unwrap(),
            vec![
                ParameterName::CallId,
                ParameterName::ConnectionMode,
                ParameterName::LocalConnectionDescriptor
            ]
        );
        assert!(requested_info(&request(Verb::Aucx).build()).unwrap().is_empty());
    }
}
