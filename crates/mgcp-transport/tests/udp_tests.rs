//! Exchange of real MGCP datagrams over loopback sockets

use std::time::Duration;

use rvoip_mgcp_core::builder::RequestBuilder;
use rvoip_mgcp_core::{ConnectionMode, MgcpMessage, TransactionId, Verb};
use rvoip_mgcp_transport::{bind_udp, Transport, TransportEvent};

#[tokio::test]
async fn test_request_with_sdp_survives_the_wire() {
    let (gateway, mut gateway_events) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let (agent, _agent_events) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();

    let request = RequestBuilder::new(Verb::Crcx, TransactionId(1204), "bridge/$@mgw".parse().unwrap())
        .call_id("A3C47F21456789F0")
        .mode(ConnectionMode::SendRecv)
        .sdp("v=0\r\nc=IN IP4 127.0.0.1\r\nm=audio 4000 RTP/AVP 0")
        .build();

    agent
        .send_message(request.clone().into(), gateway.local_addr().unwrap())
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), gateway_events.recv())
        .await
        .expect("timed out")
        .expect("channel closed");

    match event {
        TransportEvent::MessageReceived { message, source, destination } => {
            assert_eq!(message, MgcpMessage::Request(request));
            assert_eq!(source, agent.local_addr().unwrap());
            assert_eq!(destination, gateway.local_addr().unwrap());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_receive_loop_survives_garbage() {
    let (gateway, mut events) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let raw = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = gateway.local_addr().unwrap();

    raw.send_to(&[0xff, 0x00, 0x13], target).await.unwrap();
    raw.send_to(b"AUEP 9 ivr/1@mgw MGCP 1.0\r\n", target).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
    assert!(matches!(first, TransportEvent::Error { .. }));

    let second = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
    match second {
        TransportEvent::MessageReceived { message, .. } => {
            assert_eq!(message.transaction_id(), TransactionId(9));
        }
        other => panic!("unexpected event {:?}", other),
    }
}
