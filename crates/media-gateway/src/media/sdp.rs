//! Minimal audio SDP handling for the built-in RTP channel
//!
//! Only what a control plane test double needs: check that a remote
//! description is an audio session, pick common payload types and emit a
//! local description.

use std::net::IpAddr;

use rvoip_mgcp_core::ConnectionMode;

use crate::errors::{GatewayError, Result};

/// Dynamic payload type advertised for RFC 4733 telephone events
pub const TELEPHONE_EVENT_PT: u8 = 101;

/// Static payload types the built-in channel can carry, in preference order
const SUPPORTED_CODECS: &[(&str, u8)] = &[("PCMU", 0), ("PCMA", 8)];

/// What the gateway needs from a remote description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescription {
    /// Connection address (`c=`), if present
    pub address: Option<String>,
    /// Audio port from the `m=audio` line
    pub port: u16,
    /// Offered payload types in order
    pub payload_types: Vec<u8>,
}

/// Validate a remote description and extract its audio stream
pub fn parse_remote(sdp: &str) -> Result<RemoteDescription> {
    let mut lines = sdp.lines().map(str::trim).filter(|l| !l.is_empty());

    if lines.next() != Some("v=0") {
        return Err(GatewayError::unsupported_sdp("description must start with v=0"));
    }

    let mut address = None;
    let mut media = None;
    for line in lines {
        if let Some(rest) = line.strip_prefix("c=") {
            address = rest.split_whitespace().nth(2).map(str::to_string);
        } else if let Some(rest) = line.strip_prefix("m=audio ") {
            if media.is_none() {
                media = Some(rest.to_string());
            }
        }
    }

    let media = media.ok_or_else(|| GatewayError::unsupported_sdp("no m=audio line"))?;
    let mut fields = media.split_whitespace();
    let port = fields
        .next()
        .and_then(|p| p.split('/').next())
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| GatewayError::unsupported_sdp("invalid audio port"))?;
    let _protocol = fields.next();
    let payload_types = fields.filter_map(|pt| pt.parse::<u8>().ok()).collect();

    Ok(RemoteDescription {
        address,
        port,
        payload_types,
    })
}

/// Payload types for codec names from `L: a:`, defaulting to everything supported
pub fn payload_types_for(codecs: &[String]) -> Vec<u8> {
    let selected: Vec<u8> = codecs
        .iter()
        .filter_map(|name| {
            SUPPORTED_CODECS
                .iter()
                .find(|(codec, _)| codec.eq_ignore_ascii_case(name))
                .map(|(_, pt)| *pt)
        })
        .collect();

    if selected.is_empty() {
        SUPPORTED_CODECS.iter().map(|(_, pt)| *pt).collect()
    } else {
        selected
    }
}

/// Payload types both sides can use, in our preference order
pub fn negotiate(local: &[u8], remote: &RemoteDescription) -> Result<Vec<u8>> {
    let common: Vec<u8> = local
        .iter()
        .copied()
        .filter(|pt| remote.payload_types.contains(pt))
        .collect();
    if common.is_empty() {
        return Err(GatewayError::unsupported_sdp("no common audio codec"));
    }
    Ok(common)
}

fn direction(mode: ConnectionMode) -> &'static str {
    match mode {
        ConnectionMode::SendOnly => "sendonly",
        ConnectionMode::RecvOnly => "recvonly",
        ConnectionMode::SendRecv | ConnectionMode::Conference | ConnectionMode::Loopback => "sendrecv",
        _ => "inactive",
    }
}

/// Render a local audio description
pub fn build_local(
    session_id: u64,
    version: u64,
    address: IpAddr,
    port: u16,
    payload_types: &[u8],
    mode: ConnectionMode,
) -> String {
    let family = if address.is_ipv4() { "IP4" } else { "IP6" };
    let mut formats: Vec<String> = payload_types.iter().map(u8::to_string).collect();
    formats.push(TELEPHONE_EVENT_PT.to_string());

    let mut lines = vec![
        "v=0".to_string(),
        format!("o=- {} {} IN {} {}", session_id, version, family, address),
        "s=-".to_string(),
        format!("c=IN {} {}", family, address),
        "t=0 0".to_string(),
        format!("m=audio {} RTP/AVP {}", port, formats.join(" ")),
    ];
    for pt in payload_types {
        if let Some((name, _)) = SUPPORTED_CODECS.iter().find(|(_, p)| p == pt) {
            lines.push(format!("a=rtpmap:{} {}/8000", pt, name));
        }
    }
    lines.push(format!("a=rtpmap:{} telephone-event/8000", TELEPHONE_EVENT_PT));
    lines.push(format!("a=fmtp:{} 0-15", TELEPHONE_EVENT_PT));
    lines.push("a=ptime:20".to_string());
    lines.push(format!("a={}", direction(mode)));
    lines.join("\r\n")
}
