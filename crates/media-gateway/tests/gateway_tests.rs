//! End-to-end command handling through the gateway facade

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rvoip_media_gateway::config::{GatewayConfig, NamespaceConfig};
use rvoip_media_gateway::connection::{ConnectionId, ConnectionState};
use rvoip_media_gateway::endpoint::EndpointKind;
use rvoip_media_gateway::media::BasicMediaFactory;
use rvoip_media_gateway::MediaGateway;
use rvoip_mgcp_core::builder::RequestBuilder;
use rvoip_mgcp_core::{
    parse_message, ConnectionMode, EndpointId, MgcpMessage, MgcpRequest, MgcpResponse, ParameterName, ReturnCode,
    TransactionId, Verb,
};
use rvoip_mgcp_transport::Transport;

const REMOTE_SDP: &str = "v=0\r\no=- 1 1 IN IP4 10.0.0.5\r\ns=-\r\nc=IN IP4 10.0.0.5\r\nt=0 0\r\nm=audio 4000 RTP/AVP 0 101\r\n";

#[derive(Debug, Default)]
struct Recorder {
    sent: Mutex<Vec<(MgcpMessage, SocketAddr)>>,
}

#[async_trait]
impl Transport for Recorder {
    fn local_addr(&self) -> rvoip_mgcp_transport::Result<SocketAddr> {
        Ok("127.0.0.1:2427".parse().unwrap())
    }

    async fn send_message(&self, message: MgcpMessage, destination: SocketAddr) -> rvoip_mgcp_transport::Result<()> {
        self.sent.lock().push((message, destination));
        Ok(())
    }

    async fn close(&self) -> rvoip_mgcp_transport::Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

struct Harness {
    gateway: MediaGateway,
    transport: Arc<Recorder>,
}

fn call_agent() -> SocketAddr {
    "127.0.0.1:2727".parse().unwrap()
}

fn endpoint(name: &str) -> EndpointId {
    EndpointId::new(name, "mgw")
}

impl Harness {
    fn new() -> Self {
        Self::with_namespaces(vec![
            NamespaceConfig::new("bridge/", EndpointKind::Bridge)
                .with_max_connections(1)
                .with_preallocate(2),
            NamespaceConfig::new("ivr/", EndpointKind::Ivr)
                .with_max_connections(1)
                .with_preallocate(1)
                .with_max_endpoints(1),
        ])
    }

    fn with_namespaces(namespaces: Vec<NamespaceConfig>) -> Self {
        let config = GatewayConfig::new("127.0.0.1:2427".parse().unwrap())
            .with_domain("mgw")
            .with_namespaces(namespaces);
        let media = Arc::new(BasicMediaFactory::new(&config.rtp));
        let transport = Arc::new(Recorder::default());
        let gateway = MediaGateway::new(config, transport.clone(), media).unwrap();
        Self { gateway, transport }
    }

    fn responses(&self) -> Vec<MgcpResponse> {
        self.transport
            .sent
            .lock()
            .iter()
            .filter_map(|(message, _)| match message {
                MgcpMessage::Response(response) => Some(response.clone()),
                MgcpMessage::Request(_) => None,
            })
            .collect()
    }

    fn response_for(&self, transaction_id: u32) -> Option<MgcpResponse> {
        self.responses()
            .into_iter()
            .find(|r| r.transaction_id == TransactionId(transaction_id))
    }

    /// Send a request and wait for its response
    async fn request(&self, request: MgcpRequest) -> MgcpResponse {
        let transaction_id = request.transaction_id.value();
        self.gateway.handle_message(request.into(), call_agent()).await;
        for _ in 0..200 {
            if let Some(response) = self.response_for(transaction_id) {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no response for transaction {}", transaction_id);
    }
}

fn crcx(transaction_id: u32, name: &str) -> RequestBuilder {
    RequestBuilder::new(Verb::Crcx, TransactionId(transaction_id), endpoint(name))
        .call_id("A3C47F21456789F0")
        .mode(ConnectionMode::RecvOnly)
}

#[tokio::test]
async fn test_connection_lifecycle_over_mgcp() {
    let harness = Harness::new();

    let created = harness.request(crcx(1204, "bridge/$").build()).await;
    assert_eq!(created.code, ReturnCode::TransactionExecuted);
    let connection_id = created.parameter(&ParameterName::ConnectionId).unwrap().to_string();
    let specific = created.parameter(&ParameterName::SpecificEndpointId).unwrap();
    assert_eq!(specific, "bridge/1@mgw");
    assert!(created.sdp.as_deref().unwrap().contains("m=audio"));

    let modified = harness
        .request(
            RequestBuilder::new(Verb::Mdcx, TransactionId(1205), endpoint("bridge/1"))
                .call_id("A3C47F21456789F0")
                .connection_id(connection_id.as_str())
                .mode(ConnectionMode::SendRecv)
                .sdp(REMOTE_SDP)
                .build(),
        )
        .await;
    assert_eq!(modified.code, ReturnCode::TransactionExecuted);
    assert!(modified.sdp.is_some());

    let bridge = harness.gateway.registry().get_endpoint("bridge/1").unwrap();
    let connection = bridge.connection(&ConnectionId::new(&connection_id)).unwrap();
    assert_eq!(connection.mode(), ConnectionMode::SendRecv);
    assert_eq!(connection.state(), ConnectionState::Open);

    let dlcx = |tid| {
        RequestBuilder::new(Verb::Dlcx, TransactionId(tid), endpoint("bridge/1"))
            .call_id("A3C47F21456789F0")
            .connection_id(connection_id.as_str())
            .build()
    };
    let deleted = harness.request(dlcx(1206)).await;
    assert_eq!(deleted.code, ReturnCode::ConnectionDeleted);
    assert!(deleted.parameter(&ParameterName::ConnectionParameters).unwrap().contains("PS="));
    assert_eq!(connection.state(), ConnectionState::Closed);

    let repeated = harness.request(dlcx(1207)).await;
    assert_eq!(repeated.code.as_u16(), 515);
    assert_eq!(harness.gateway.pools().rtp_channels.in_use(), 0);
}

#[tokio::test]
async fn test_wire_round_trip_of_response() {
    let harness = Harness::new();
    let response = harness.request(crcx(1300, "bridge/$").sdp(REMOTE_SDP).build()).await;

    let datagram = response.to_string();
    assert!(datagram.starts_with("200 1300 "));
    match parse_message(datagram.as_bytes()).unwrap() {
        MgcpMessage::Response(parsed) => {
            assert_eq!(parsed.code, ReturnCode::TransactionExecuted);
            assert_eq!(parsed.parameter(&ParameterName::ConnectionId), response.parameter(&ParameterName::ConnectionId));
            assert!(parsed.sdp.is_some());
        }
        MgcpMessage::Request(_) => panic!("expected a response"),
    }
}

#[tokio::test]
async fn test_audit_unknown_endpoint_is_500() {
    let harness = Harness::new();
    let response = harness
        .request(RequestBuilder::new(Verb::Auep, TransactionId(1400), endpoint("bridge/99")).build())
        .await;
    assert_eq!(response.code.as_u16(), 500);

    let response = harness
        .request(RequestBuilder::new(Verb::Auep, TransactionId(1401), endpoint("nope/1")).build())
        .await;
    assert_eq!(response.code.as_u16(), 500);
}

#[tokio::test]
async fn test_audit_endpoint_reports_state() {
    let harness = Harness::new();
    let created = harness.request(crcx(1410, "bridge/1").build()).await;
    let connection_id = created.parameter(&ParameterName::ConnectionId).unwrap().to_string();

    let audit = harness
        .request(
            RequestBuilder::new(Verb::Auep, TransactionId(1411), endpoint("bridge/1"))
                .parameter(ParameterName::RequestedInfo, "I,A")
                .build(),
        )
        .await;
    assert_eq!(audit.code, ReturnCode::TransactionExecuted);
    assert_eq!(audit.parameter(&ParameterName::ConnectionId), Some(connection_id.as_str()));
    assert!(audit.parameter(&ParameterName::Capabilities).unwrap().contains("v:"));

    let all = harness
        .request(RequestBuilder::new(Verb::Auep, TransactionId(1412), endpoint("bridge/*")).build())
        .await;
    let listed: Vec<&str> = all.parameters.get_all(&ParameterName::SpecificEndpointId).collect();
    assert_eq!(listed, vec!["bridge/1@mgw", "bridge/2@mgw"]);
}

#[tokio::test]
async fn test_audit_connection() {
    let harness = Harness::new();
    let created = harness.request(crcx(1420, "bridge/1").sdp(REMOTE_SDP).build()).await;
    let connection_id = created.parameter(&ParameterName::ConnectionId).unwrap().to_string();

    let audit = harness
        .request(
            RequestBuilder::new(Verb::Aucx, TransactionId(1421), endpoint("bridge/1"))
                .connection_id(connection_id.as_str())
                .parameter(ParameterName::RequestedInfo, "C,M,LC")
                .build(),
        )
        .await;
    assert_eq!(audit.code, ReturnCode::TransactionExecuted);
    assert_eq!(audit.parameter(&ParameterName::CallId), Some("A3C47F21456789F0"));
    assert_eq!(audit.parameter(&ParameterName::ConnectionMode), Some("recvonly"));
    assert!(audit.sdp.is_some());

    let missing = harness
        .request(
            RequestBuilder::new(Verb::Aucx, TransactionId(1422), endpoint("bridge/1"))
                .connection_id("FFFF")
                .build(),
        )
        .await;
    assert_eq!(missing.code.as_u16(), 515);
}

#[tokio::test]
async fn test_unsupported_verb_is_504() {
    let harness = Harness::new();
    let response = harness
        .request(RequestBuilder::new(Verb::Epcf, TransactionId(1500), endpoint("bridge/1")).build())
        .await;
    assert_eq!(response.code.as_u16(), 504);
}

#[tokio::test]
async fn test_retransmitted_crcx_creates_one_connection() {
    let harness = Harness::new();
    let request = crcx(1600, "bridge/$").build();

    harness.gateway.handle_message(request.clone().into(), call_agent()).await;
    harness.gateway.handle_message(request.clone().into(), call_agent()).await;
    let first = harness.request(request.clone()).await;
    let again = harness.request(request).await;

    let total: usize = harness
        .gateway
        .registry()
        .endpoints()
        .iter()
        .map(|e| e.connection_count())
        .sum();
    assert_eq!(total, 1);
    assert!(harness.responses().iter().all(|r| *r == first));
    assert_eq!(first, again);
}

#[tokio::test]
async fn test_capacity_and_resolution_errors() {
    let harness = Harness::new();
    assert_eq!(
        harness.request(crcx(1700, "ivr/1").build()).await.code,
        ReturnCode::TransactionExecuted
    );
    // One connection per endpoint
    assert_eq!(harness.request(crcx(1701, "ivr/1").build()).await.code.as_u16(), 502);
    // The namespace may not grow past one endpoint
    assert_eq!(harness.request(crcx(1702, "ivr/$").build()).await.code.as_u16(), 410);
    assert_eq!(harness.request(crcx(1703, "ivr/*").build()).await.code.as_u16(), 503);
    assert_eq!(harness.request(crcx(1704, "ivr/7").build()).await.code.as_u16(), 500);
}

#[tokio::test]
async fn test_local_connection_pair() {
    let harness = Harness::new();
    let response = harness
        .request(
            crcx(1800, "bridge/1")
                .mode(ConnectionMode::SendRecv)
                .second_endpoint(&endpoint("bridge/$"))
                .build(),
        )
        .await;
    assert_eq!(response.code, ReturnCode::TransactionExecuted);
    assert!(response.parameter(&ParameterName::SecondConnectionId).is_some());
    assert_eq!(response.parameter(&ParameterName::SecondEndpointId), Some("bridge/2@mgw"));

    let registry = harness.gateway.registry();
    let first = registry.get_endpoint("bridge/1").unwrap();
    let second = registry.get_endpoint("bridge/2").unwrap();
    assert_eq!(first.connection_count(), 1);
    assert_eq!(second.connection_count(), 1);

    // Deleting one side of the pair closes the other
    let deleted = harness
        .request(RequestBuilder::new(Verb::Dlcx, TransactionId(1801), endpoint("bridge/1")).build())
        .await;
    assert_eq!(deleted.code, ReturnCode::ConnectionDeleted);
    for _ in 0..100 {
        if second.connection_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(second.connection_count(), 0);
}

#[tokio::test]
async fn test_local_connection_pair_needs_two_endpoints() {
    let harness = Harness::with_namespaces(vec![NamespaceConfig::new("mix/", EndpointKind::Bridge)
        .with_max_connections(2)
        .with_preallocate(1)
        .with_max_endpoints(2)]);

    let same = harness
        .request(crcx(1850, "mix/1").second_endpoint(&endpoint("mix/1")).build())
        .await;
    assert_eq!(same.code.as_u16(), 538);
    let first = harness.gateway.registry().get_endpoint("mix/1").unwrap();
    assert_eq!(first.connection_count(), 0);

    // mix/1 still has room, but `$` for Z2 must pick another endpoint
    let paired = harness
        .request(crcx(1851, "mix/$").second_endpoint(&endpoint("mix/$")).build())
        .await;
    assert_eq!(paired.code, ReturnCode::TransactionExecuted);
    assert_eq!(paired.parameter(&ParameterName::SpecificEndpointId), Some("mix/1@mgw"));
    assert_eq!(paired.parameter(&ParameterName::SecondEndpointId), Some("mix/2@mgw"));
    let second = harness.gateway.registry().get_endpoint("mix/2").unwrap();
    assert_eq!(first.connection_count(), 1);
    assert_eq!(second.connection_count(), 1);
}

#[tokio::test]
async fn test_calls_survive_provider_uninstall() {
    let harness = Harness::new();
    let created = harness.request(crcx(1860, "bridge/1").sdp(REMOTE_SDP).build()).await;
    let connection_id = created.parameter(&ParameterName::ConnectionId).unwrap().to_string();
    harness.gateway.registry().uninstall_provider("bridge/").unwrap();

    let modified = harness
        .request(
            RequestBuilder::new(Verb::Mdcx, TransactionId(1861), endpoint("bridge/1"))
                .call_id("A3C47F21456789F0")
                .connection_id(connection_id.as_str())
                .mode(ConnectionMode::SendRecv)
                .build(),
        )
        .await;
    assert_eq!(modified.code, ReturnCode::TransactionExecuted);

    let dlcx = |tid, call_id| {
        RequestBuilder::new(Verb::Dlcx, TransactionId(tid), endpoint("bridge/1"))
            .call_id(call_id)
            .connection_id(connection_id.as_str())
            .build()
    };
    let wrong_call = harness.request(dlcx(1862, "0000")).await;
    assert_eq!(wrong_call.code.as_u16(), 516);

    let deleted = harness.request(dlcx(1863, "A3C47F21456789F0")).await;
    assert_eq!(deleted.code, ReturnCode::ConnectionDeleted);
    assert_eq!(harness.gateway.pools().rtp_channels.in_use(), 0);

    // No new calls on the uninstalled namespace
    assert_eq!(harness.request(crcx(1864, "bridge/$").build()).await.code.as_u16(), 500);
}

#[tokio::test]
async fn test_rqnt_rejects_unknown_packages_and_events() {
    let harness = Harness::new();
    let rqnt = |tid, events: &str| {
        RequestBuilder::new(Verb::Rqnt, TransactionId(tid), endpoint("bridge/1"))
            .request_id("0123")
            .parameter(ParameterName::RequestedEvents, events)
            .build()
    };

    assert_eq!(harness.request(rqnt(1900, "XY/foo(N)")).await.code.as_u16(), 518);
    assert_eq!(harness.request(rqnt(1901, "AU/zz(N)")).await.code.as_u16(), 522);
    assert_eq!(
        harness.request(rqnt(1902, "D/5(N),AU/oc(N)")).await.code,
        ReturnCode::TransactionExecuted
    );

    let bridge = harness.gateway.registry().get_endpoint("bridge/1").unwrap();
    let state = bridge.notification_state();
    assert_eq!(state.request_id.as_deref(), Some("0123"));
    assert_eq!(state.requested_events.len(), 2);
}

#[tokio::test]
async fn test_rqnt_with_missing_request_id_is_510() {
    let harness = Harness::new();
    let response = harness
        .request(RequestBuilder::new(Verb::Rqnt, TransactionId(1950), endpoint("bridge/1")).build())
        .await;
    assert_eq!(response.code.as_u16(), 510);
}
