//! Wire protocol codec.
//!
//! Each frame is text: a single ASCII digit tag followed by a kind-specific
//! body. Decode is total — a frame either parses into a [`Message`] or fails
//! with a [`ProtocolError`]; there are no partial results.
//!
//! Frame layout by tag:
//!
//! | tag | kind        | body                                  |
//! |-----|-------------|---------------------------------------|
//! | `0` | Open        | handshake header JSON                 |
//! | `1` | Close       | —                                     |
//! | `2` | Ping        | — (trailing payload ignored)          |
//! | `3` | Pong        | — (trailing payload ignored)          |
//! | `4` | Empty       | —                                     |
//! | `5` | Emit        | `["name"]` or `["name",<arg>]`        |
//! | `6` | AckRequest  | `<id>["name"]` or `<id>["name",<arg>]`|
//! | `7` | AckResponse | `<id>[]` or `<id>[<result>]`          |

use serde::{Deserialize, Serialize};

use crate::error::{Error, ProtocolError};

/// Wire message kind, in tag order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Open,
    Close,
    Ping,
    Pong,
    Empty,
    Emit,
    AckRequest,
    AckResponse,
}

/// One decoded unit of the wire protocol. Immutable once produced.
///
/// `args` is the raw serialized JSON payload of a single argument (or result
/// value); it is decoded into a typed value only at the dispatch boundary,
/// where the handler's expected type is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake frame; `payload` is the raw header JSON after the tag.
    Open { payload: String },
    Close,
    Ping,
    Pong,
    Empty,
    Emit {
        method: String,
        args: Option<String>,
    },
    AckRequest {
        ack_id: u64,
        method: String,
        args: Option<String>,
    },
    AckResponse {
        ack_id: u64,
        args: Option<String>,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Open { .. } => MessageKind::Open,
            Message::Close => MessageKind::Close,
            Message::Ping => MessageKind::Ping,
            Message::Pong => MessageKind::Pong,
            Message::Empty => MessageKind::Empty,
            Message::Emit { .. } => MessageKind::Emit,
            Message::AckRequest { .. } => MessageKind::AckRequest,
            Message::AckResponse { .. } => MessageKind::AckResponse,
        }
    }

    /// Decode one raw frame.
    pub fn decode(raw: &str) -> Result<Message, ProtocolError> {
        let tag = raw.chars().next().ok_or(ProtocolError::EmptyFrame)?;
        if !tag.is_ascii_digit() {
            return Err(ProtocolError::UnknownTag(tag));
        }
        let rest = &raw[1..];

        match tag {
            '0' => Ok(Message::Open {
                payload: rest.to_string(),
            }),
            '1' => Ok(Message::Close),
            '2' => Ok(Message::Ping),
            '3' => Ok(Message::Pong),
            '4' => Ok(Message::Empty),
            '5' => {
                let (method, args) = parse_event_body(rest)?;
                Ok(Message::Emit { method, args })
            }
            '6' => {
                let (ack_id, body) = split_ack_id(rest)?;
                let (method, args) = parse_event_body(body)?;
                Ok(Message::AckRequest {
                    ack_id,
                    method,
                    args,
                })
            }
            '7' => {
                let (ack_id, body) = split_ack_id(rest)?;
                let args = parse_result_body(body)?;
                Ok(Message::AckResponse { ack_id, args })
            }
            _ => Err(ProtocolError::UnknownTag(tag)),
        }
    }

    /// Encode to a raw frame. Deterministic inverse of [`Message::decode`]:
    /// kind, ack id, method and args survive a round trip.
    pub fn encode(&self) -> String {
        match self {
            Message::Open { payload } => format!("0{payload}"),
            Message::Close => "1".to_string(),
            Message::Ping => "2".to_string(),
            Message::Pong => "3".to_string(),
            Message::Empty => "4".to_string(),
            Message::Emit { method, args } => format!("5{}", event_body(method, args)),
            Message::AckRequest {
                ack_id,
                method,
                args,
            } => format!("6{ack_id}{}", event_body(method, args)),
            Message::AckResponse { ack_id, args } => match args {
                Some(result) => format!("7{ack_id}[{result}]"),
                None => format!("7{ack_id}[]"),
            },
        }
    }
}

fn event_body(method: &str, args: &Option<String>) -> String {
    let name = serde_json::Value::String(method.to_string()).to_string();
    match args {
        Some(arg) => format!("[{name},{arg}]"),
        None => format!("[{name}]"),
    }
}

/// Split leading ack-id digits from the bracketed body that follows.
fn split_ack_id(rest: &str) -> Result<(u64, &str), ProtocolError> {
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return Err(ProtocolError::MissingAckId);
    }
    let ack_id = rest[..digits]
        .parse::<u64>()
        .map_err(|e| ProtocolError::BadAckId(e.to_string()))?;
    Ok((ack_id, &rest[digits..]))
}

/// Parse an Emit/AckRequest body: a JSON array of the event name and an
/// optional single argument. The argument keeps its source text verbatim
/// (via `RawValue`) so key order and formatting survive re-encoding.
fn parse_event_body(body: &str) -> Result<(String, Option<String>), ProtocolError> {
    let values: Vec<&serde_json::value::RawValue> =
        serde_json::from_str(body).map_err(|e| ProtocolError::BadBody(e.to_string()))?;
    if values.len() > 2 {
        return Err(ProtocolError::BadBody("at most one argument".into()));
    }
    let mut values = values.into_iter();
    let name = values
        .next()
        .ok_or_else(|| ProtocolError::BadBody("event name must be a string".into()))?;
    let method: String = serde_json::from_str(name.get())
        .map_err(|_| ProtocolError::BadBody("event name must be a string".into()))?;
    let args = values.next().map(|v| v.get().to_string());
    Ok((method, args))
}

/// Parse an AckResponse body: a JSON array of at most one result value,
/// kept verbatim like an event argument.
fn parse_result_body(body: &str) -> Result<Option<String>, ProtocolError> {
    let values: Vec<&serde_json::value::RawValue> =
        serde_json::from_str(body).map_err(|e| ProtocolError::BadBody(e.to_string()))?;
    if values.len() > 1 {
        return Err(ProtocolError::BadBody("at most one result value".into()));
    }
    Ok(values.into_iter().next().map(|v| v.get().to_string()))
}

/// Engine-level handshake header carried by the Open frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Header {
    pub sid: String,
    pub upgrades: Vec<String>,
    /// Milliseconds.
    pub ping_interval: u64,
    /// Milliseconds.
    pub ping_timeout: u64,
}

impl Header {
    pub fn parse(payload: &str) -> Result<Header, Error> {
        serde_json::from_str(payload).map_err(|e| Error::WrongHeader(e.to_string()))
    }
}
