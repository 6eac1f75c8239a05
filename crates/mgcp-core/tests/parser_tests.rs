//! Parser tests against complete MGCP messages

use proptest::prelude::*;

use rvoip_mgcp_core::{
    parse_message, ConnectionMode, LocalConnectionOptions, MgcpMessage, ParameterName, RequestedEvent,
    ReturnCode, TransactionId, Verb,
};

fn request(bytes: &[u8]) -> rvoip_mgcp_core::MgcpRequest {
    match parse_message(bytes).expect("message should parse") {
        MgcpMessage::Request(request) => request,
        other => panic!("expected request, got {:?}", other),
    }
}

#[test]
fn test_crcx_with_sdp() {
    let datagram = b"CRCX 1204 bridge/$@mgw.example.net MGCP 1.0\r\n\
C: A3C47F21456789F0\r\n\
L: p:10, a:PCMU\r\n\
M: recvonly\r\n\
\r\n\
v=0\r\n\
o=- 25678 753849 IN IP4 128.96.41.1\r\n\
c=IN IP4 128.96.41.1\r\n\
m=audio 3456 RTP/AVP 0\r\n";

    let request = request(datagram);
    assert_eq!(request.verb, Verb::Crcx);
    assert_eq!(request.transaction_id, TransactionId(1204));
    assert_eq!(request.endpoint.to_string(), "bridge/$@mgw.example.net");
    assert_eq!(request.parameter(&ParameterName::CallId), Some("A3C47F21456789F0"));

    let mode: ConnectionMode = request
        .parameter(&ParameterName::ConnectionMode)
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(mode, ConnectionMode::RecvOnly);

    let options: LocalConnectionOptions = request
        .parameter(&ParameterName::LocalConnectionOptions)
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(options.packetization_ms(), Some(10));

    let sdp = request.sdp.expect("sdp body");
    assert!(sdp.starts_with("v=0"));
    assert!(sdp.contains("m=audio 3456 RTP/AVP 0"));
}

#[test]
fn test_bare_lf_and_piggyback_separator() {
    let datagram = b"RQNT 1201 ivr/1@gw MGCP 1.0\nN: ca@ca1.example.net:2727\nX: 0123456789AC\nR: AU/oc(N), AU/of(N)\nS: AU/pa(an=hello.wav)\n.\n200 1200 OK\n";
    let request = request(datagram);
    assert_eq!(request.verb, Verb::Rqnt);
    assert!(request.sdp.is_none());

    let events = RequestedEvent::parse_list(request.parameter(&ParameterName::RequestedEvents).unwrap()).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(request.parameter(&ParameterName::NotifiedEntity), Some("ca@ca1.example.net:2727"));
}

#[test]
fn test_response_with_parameters_and_sdp() {
    let datagram = b"200 1204 OK\r\nI: FDE234C8\r\nZ: bridge/1@gw\r\n\r\nv=0\r\nm=audio 3456 RTP/AVP 0\r\n";
    match parse_message(datagram).unwrap() {
        MgcpMessage::Response(response) => {
            assert_eq!(response.code, ReturnCode::TransactionExecuted);
            assert_eq!(response.message, "OK");
            assert_eq!(response.parameter(&ParameterName::ConnectionId), Some("FDE234C8"));
            assert_eq!(response.sdp.as_deref(), Some("v=0\r\nm=audio 3456 RTP/AVP 0"));
        }
        other => panic!("expected response, got {:?}", other),
    }
}

#[test]
fn test_rejects_malformed_messages() {
    assert!(parse_message(b"").is_err());
    assert!(parse_message(b"\r\n\r\n").is_err());
    assert!(parse_message(b"CRCX 1 bridge/1@gw MGCP 1.0\r\nnot a parameter\r\n").is_err());
    assert!(parse_message(b"CRCX 1 bridge/1 MGCP 1.0\r\n").is_err());
    assert!(parse_message(&[0xff, 0xfe, 0x00]).is_err());
}

#[test]
fn test_rendered_request_parses_back() {
    let original = request(b"MDCX 77 bridge/3@gw MGCP 1.0\r\nC: 1\r\nI: 2A\r\nM: sendrecv\r\n\r\nv=0\r\nm=audio 4000 RTP/AVP 0\r\n");
    let reparsed = request(original.to_string().as_bytes());
    assert_eq!(original, reparsed);
}

proptest! {
    #[test]
    fn prop_parser_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = parse_message(&data);
    }

    #[test]
    fn prop_transaction_ids_survive_rendering(tid in 1u32..=999_999_999u32, n in 1u32..5000) {
        let text = format!("AUEP {} ivr/{}@gw MGCP 1.0\r\nF: I, N\r\n", tid, n);
        match parse_message(text.as_bytes()).unwrap() {
            MgcpMessage::Request(request) => {
                prop_assert_eq!(request.transaction_id, TransactionId(tid));
                let rendered = request.to_string();
                prop_assert_eq!(rendered, text);
            }
            MgcpMessage::Response(_) => prop_assert!(false, "parsed as response"),
        }
    }
}
