//! Denon/Marantz control protocol (DCP) line framing and HEOS envelopes
//!
//! The AVR socket (port 23) carries CR-terminated ASCII lines. The HEOS socket (port 1255)
//! carries JSON objects terminated by CR LF. Both go through [`DcpDecoder`].

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};
use serde::Deserialize;

use crate::error::CodecError;

pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';
/// Literal prefix of every HEOS response.
pub const HEOS_PREFIX: &str = "{\"heos\":";
/// Prefix of outbound payloads routed to the HEOS socket.
pub const HEOS_SCHEME: &str = "heos://";
/// Separator used to pack several DCP commands into one outbound payload.
pub const MSG_SEP: &str = "<SEP>";
/// Status request suffix.
pub const REQ: &str = "?";
/// Responses some receivers send without a line terminator.
pub const NO_TERMINATOR_PREFIXES: &[&str] = &["OPTPN"];

/// Tries to cut one line from the front of `buf`.
///
/// Returns the line (without CR/LF) and the number of bytes consumed. `(None, 0)` means more
/// data is needed. An empty line is reported as `Some("")`.
pub fn try_extract_line(buf: &[u8]) -> (Option<String>, usize) {
    // Leading LF belongs to the previous CR LF pair split across reads
    let skip = buf.iter().take_while(|b| **b == LF).count();
    let rest = &buf[skip..];

    match rest.iter().position(|b| *b == CR) {
        Some(pos) => {
            let mut consumed = skip + pos + 1;
            if buf.get(consumed) == Some(&LF) {
                consumed += 1;
            }
            let line = String::from_utf8_lossy(&rest[..pos]).into_owned();
            (Some(line), consumed)
        }
        None => {
            let text = String::from_utf8_lossy(rest);
            if NO_TERMINATOR_PREFIXES.iter().any(|p| text.starts_with(p)) {
                (Some(text.into_owned()), buf.len())
            } else {
                (None, skip)
            }
        }
    }
}

/// Outbound framing for the AVR socket.
pub fn encode_line(cmd: &str) -> Bytes {
    let mut out = BytesMut::with_capacity(cmd.len() + 1);
    out.extend_from_slice(cmd.as_bytes());
    out.extend_from_slice(b"\r");
    out.freeze()
}

/// Outbound framing for the HEOS socket.
pub fn encode_heos(cmd: &str) -> Bytes {
    let mut out = BytesMut::with_capacity(cmd.len() + 2);
    out.extend_from_slice(cmd.as_bytes());
    out.extend_from_slice(b"\r\n");
    out.freeze()
}

/// Line accumulator shared by the AVR and HEOS sockets.
#[derive(Debug, Default)]
pub struct DcpDecoder {
    buf: BytesMut,
}

impl DcpDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next non-empty line in wire order.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let (line, consumed) = try_extract_line(&self.buf);
            self.buf.advance(consumed.min(self.buf.len()));
            match line {
                Some(l) if l.is_empty() => continue,
                Some(l) => return Some(l),
                None => return None,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    heos: Header,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Header {
    command: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    message: String,
}

/// A decoded HEOS response.
#[derive(Debug, Clone, PartialEq)]
pub struct HeosMessage {
    pub command: String,
    pub result: Option<String>,
    pub message: HeosTokens,
    pub payload: serde_json::Value,
}

impl HeosMessage {
    pub fn parse(line: &str) -> Result<Self, CodecError> {
        let env: Envelope =
            serde_json::from_str(line).map_err(|e| CodecError::InvalidHeos(e.to_string()))?;
        Ok(Self {
            command: env.heos.command,
            result: env.heos.result,
            message: HeosTokens::parse(&env.heos.message),
            payload: env.payload,
        })
    }

    /// Events carry no result field; commands must report success.
    pub fn is_success(&self) -> bool {
        self.result.as_deref().map_or(true, |r| r == "success")
    }
}

/// The `heos.message` field: `key=value` pairs joined by `&`, bare flags allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeosTokens(HashMap<String, String>);

impl HeosTokens {
    pub fn parse(message: &str) -> Self {
        let mut map = HashMap::new();
        for token in message.split('&').filter(|t| !t.is_empty()) {
            match token.split_once('=') {
                Some((k, v)) => map.insert(k.to_string(), v.to_string()),
                None => map.insert(token.to_string(), String::new()),
            };
        }
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// Reverses the escaping HEOS applies to names inside `heos.message` and payloads.
pub fn unescape_heos(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}
