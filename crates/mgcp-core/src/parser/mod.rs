//! # MGCP Message Parser
//!
//! Parses a datagram into an [`MgcpMessage`]. The grammar is the one of RFC
//! 3435 Section 3.1:
//!
//! ```text
//! request-line  = verb SP transaction-id SP endpoint-name SP "MGCP" SP version EOL
//! response-line = 3DIGIT SP transaction-id [SP commentary] EOL
//! parameter     = code ":" [SP] value EOL
//! message       = first-line *parameter [EOL session-description]
//! ```
//!
//! Line endings may be CRLF or a bare LF. A line consisting of a single `.`
//! separates piggy-backed messages; only the first message is returned.

pub(crate) mod utils;

use std::str;

use nom::{
    bytes::complete::{take_till1, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{opt, rest},
    sequence::{preceded, tuple},
    IResult,
};
use tracing::trace;

use crate::error::{Error, Result};
use crate::message::{MgcpMessage, MgcpRequest, MgcpResponse};
use crate::types::{EndpointId, ParameterName, Parameters, ReturnCode, TransactionId, Verb};

/// Tokens of a request line, before semantic validation
fn request_line_tokens(input: &str) -> IResult<&str, (&str, &str, &str, &str)> {
    let (input, (verb, _, tid, _, endpoint, _, version)) = tuple((
        take_while1(|c: char| c.is_ascii_alphabetic()),
        space1,
        digit1,
        space1,
        take_till1(|c: char| c == ' ' || c == '\t'),
        space1,
        rest,
    ))(input)?;
    Ok((input, (verb, tid, endpoint, version)))
}

/// Tokens of a response line, before semantic validation
fn response_line_tokens(input: &str) -> IResult<&str, (&str, &str, Option<&str>)> {
    let (input, (code, _, tid, commentary)) = tuple((
        digit1,
        space1,
        digit1,
        opt(preceded(space1, rest)),
    ))(input)?;
    Ok((input, (code, tid, commentary)))
}

/// `code: value`
fn parameter_tokens(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, (code, _, _, _, value)) = tuple((
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        space0,
        char(':'),
        space0,
        rest,
    ))(input)?;
    Ok((input, (code, value)))
}

/// Parse a request line into its components
pub fn parse_request_line(line: &str) -> Result<(Verb, TransactionId, EndpointId, String)> {
    let (_, (verb, tid, endpoint, version)) = request_line_tokens(line.trim())
        .map_err(|e| Error::parse(format!("malformed request line '{}': {}", line, e)))?;

    let verb: Verb = verb.parse()?;
    let transaction_id: TransactionId = tid.parse()?;
    let endpoint: EndpointId = endpoint.parse()?;
    let version = version.trim();
    if !version
        .get(..4)
        .map(|v| v.eq_ignore_ascii_case("MGCP"))
        .unwrap_or(false)
    {
        return Err(Error::UnsupportedVersion(version.to_string()));
    }

    Ok((verb, transaction_id, endpoint, version.to_string()))
}

/// Parse a response line into its components
pub fn parse_response_line(line: &str) -> Result<(ReturnCode, TransactionId, String)> {
    let (_, (code, tid, commentary)) = response_line_tokens(line.trim())
        .map_err(|e| Error::parse(format!("malformed response line '{}': {}", line, e)))?;

    if code.len() != 3 {
        return Err(Error::parse(format!("return code must be 3 digits, got '{}'", code)));
    }
    let code = code
        .parse::<u16>()
        .map_err(|_| Error::parse(format!("invalid return code '{}'", code)))?;
    let transaction_id: TransactionId = tid.parse()?;

    Ok((
        ReturnCode::from_u16(code),
        transaction_id,
        commentary.unwrap_or("").trim().to_string(),
    ))
}

/// Parse a single parameter line
pub fn parse_parameter_line(line: &str) -> Result<(ParameterName, String)> {
    let (_, (code, value)) = parameter_tokens(line.trim())
        .map_err(|e| Error::parse(format!("malformed parameter line '{}': {}", line, e)))?;
    Ok((code.parse()?, value.trim().to_string()))
}

/// Parse one MGCP message from a datagram
pub fn parse_message(input: &[u8]) -> Result<MgcpMessage> {
    let text = str::from_utf8(input).map_err(|_| Error::InvalidUtf8)?;

    let mut lines = text.lines().skip_while(|line| line.trim().is_empty());
    let first = lines
        .next()
        .ok_or_else(|| Error::parse("empty message"))?;

    let mut parameters = Parameters::new();
    let mut sdp_lines: Vec<&str> = Vec::new();
    let mut in_sdp = false;

    for line in lines {
        if line.trim() == "." {
            trace!("Ignoring piggy-backed messages after separator");
            break;
        }
        if in_sdp {
            sdp_lines.push(line);
            continue;
        }
        if line.trim().is_empty() {
            in_sdp = true;
            continue;
        }
        let (name, value) = parse_parameter_line(line)?;
        match name {
            // repeated Z: lines are legal in wildcard audit responses
            ParameterName::SpecificEndpointId => parameters.append(name, value),
            _ => parameters.insert(name, value),
        }
    }

    while sdp_lines.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        sdp_lines.pop();
    }
    let sdp = if sdp_lines.is_empty() {
        None
    } else {
        Some(sdp_lines.join("\r\n"))
    };

    let is_response = first
        .trim_start()
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false);

    if is_response {
        let (code, transaction_id, message) = parse_response_line(first)?;
        Ok(MgcpMessage::Response(MgcpResponse {
            code,
            transaction_id,
            message,
            parameters,
            sdp,
        }))
    } else {
        let (verb, transaction_id, endpoint, version) = parse_request_line(first)?;
        Ok(MgcpMessage::Request(MgcpRequest {
            verb,
            transaction_id,
            endpoint,
            version,
            parameters,
            sdp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line() {
        let (verb, tid, endpoint, version) =
            parse_request_line("CRCX 1204 bridge/$@mgw.example.net MGCP 1.0").unwrap();
        assert_eq!(verb, Verb::Crcx);
        assert_eq!(tid, TransactionId(1204));
        assert_eq!(endpoint.local_name(), "bridge/$");
        assert_eq!(version, "MGCP 1.0");

        assert!(matches!(
            parse_request_line("CRCX 1204 bridge/1@gw SIP/2.0"),
            Err(Error::UnsupportedVersion(_))
        ));
        assert!(matches!(
            parse_request_line("FOO 1204 bridge/1@gw MGCP 1.0"),
            Err(Error::UnknownVerb(_))
        ));
        assert!(parse_request_line("CRCX bridge/1@gw MGCP 1.0").is_err());
    }

    #[test]
    fn test_response_line() {
        let (code, tid, message) = parse_response_line("250 99 Connection deleted").unwrap();
        assert_eq!(code, ReturnCode::ConnectionDeleted);
        assert_eq!(tid, TransactionId(99));
        assert_eq!(message, "Connection deleted");

        let (code, _, message) = parse_response_line("200 5").unwrap();
        assert_eq!(code, ReturnCode::TransactionExecuted);
        assert!(message.is_empty());

        assert!(parse_response_line("20 5 OK").is_err());
    }

    #[test]
    fn test_parameter_line() {
        let (name, value) = parse_parameter_line("L: p:20, a:PCMU").unwrap();
        assert_eq!(name, ParameterName::LocalConnectionOptions);
        assert_eq!(value, "p:20, a:PCMU");

        let (name, value) = parse_parameter_line("c:A3C4").unwrap();
        assert_eq!(name, ParameterName::CallId);
        assert_eq!(value, "A3C4");

        assert!(parse_parameter_line("no colon here").is_err());
    }
}
