//! Wire frames and the Socket.IO envelope.
//!
//! Every WebSocket message becomes a [`Frame`]: a direction, a tag and the
//! untouched payload. The tag is the Socket.IO event name for event
//! packets (`42["event",body]`) and a fixed name for Engine.IO control
//! packets. The server ships most bodies as binary attachments announced by
//! a text header (`451-["event",{"_placeholder":true,"num":0}]`);
//! [`FrameDecoder`] carries the header's event name over to the attachment.

use std::borrow::Cow;

use serde::Serialize;
use serde_json::Value;
use tungstenite::Message;

use crate::{OptioError, Result};

/// Which way a frame crossed the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Raw frame contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the payload as text, replacing invalid UTF-8 in binary data.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(text) => Cow::Borrowed(text),
            Payload::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }
}

/// One discrete message exchanged over the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    direction: Direction,
    tag: String,
    payload: Payload,
}

impl Frame {
    #[must_use]
    pub fn new(direction: Direction, tag: impl Into<String>, payload: Payload) -> Self {
        Self {
            direction,
            tag: tag.into(),
            payload,
        }
    }

    /// Builds an inbound text frame, deriving the tag from the envelope.
    #[must_use]
    pub fn inbound_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let tag = envelope_tag(&text);
        Self::new(Direction::Inbound, tag, Payload::Text(text))
    }

    /// Builds an outbound `42["event",body]` frame.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::Json`] if `body` fails to serialize.
    pub fn outbound_event<T: Serialize>(event: &str, body: &T) -> Result<Self> {
        let envelope = serde_json::to_string(&(event, body))?;
        Ok(Self::new(
            Direction::Outbound,
            event,
            Payload::Text(format!("42{envelope}")),
        ))
    }

    /// Builds an outbound frame from caller-supplied text, sent verbatim.
    #[must_use]
    pub fn outbound_raw(text: impl Into<String>) -> Self {
        let text = text.into();
        let tag = envelope_tag(&text);
        Self::new(Direction::Outbound, tag, Payload::Text(text))
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns `true` for a binary-event header whose body follows separately.
    pub fn is_placeholder(&self) -> bool {
        match &self.payload {
            Payload::Text(text) => is_binary_header(split_prefix(text).0),
            Payload::Binary(_) => false,
        }
    }

    /// Extracts the JSON body carried by the frame.
    ///
    /// Event packets yield the second element of their `[event, body]`
    /// array, binary attachments their whole content, and control packets
    /// their trailing JSON object. Returns `Ok(None)` when there is no body.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::MalformedFrame`] if the JSON cannot be parsed.
    pub fn body(&self) -> Result<Option<Value>> {
        match &self.payload {
            Payload::Binary(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| malformed(&self.tag, e)),
            Payload::Text(text) => {
                let (prefix, rest) = split_prefix(text);
                if rest.trim().is_empty() {
                    return Ok(None);
                }
                let value: Value = serde_json::from_str(rest).map_err(|e| malformed(&self.tag, e))?;
                if prefix.starts_with("42") || is_binary_header(prefix) {
                    Ok(match value {
                        Value::Array(mut items) if items.len() > 1 => Some(items.swap_remove(1)),
                        _ => None,
                    })
                } else {
                    Ok(Some(value))
                }
            }
        }
    }

    /// Converts the frame into a WebSocket message for sending.
    pub fn into_message(self) -> Message {
        match self.payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(bytes) => Message::Binary(bytes.into()),
        }
    }
}

/// Turns inbound WebSocket messages into [`Frame`]s, pairing binary
/// attachments with the header that announced them.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending_tag: Option<String>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one message. WebSocket-level control messages yield `None`.
    pub fn decode(&mut self, message: Message) -> Option<Frame> {
        match message {
            Message::Text(text) => {
                let frame = Frame::inbound_text(text.as_str());
                if frame.is_placeholder() {
                    self.pending_tag = Some(frame.tag().to_string());
                }
                Some(frame)
            }
            Message::Binary(bytes) => {
                let tag = self.pending_tag.take().unwrap_or_default();
                Some(Frame::new(
                    Direction::Inbound,
                    tag,
                    Payload::Binary(bytes.to_vec()),
                ))
            }
            _ => None,
        }
    }
}

/// Splits an Engine.IO packet into its numeric prefix and the rest.
///
/// The prefix covers packet type digits and the binary attachment
/// count terminator (`451-`).
fn split_prefix(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '-'))
        .unwrap_or(text.len());
    text.split_at(end)
}

fn is_binary_header(prefix: &str) -> bool {
    prefix.starts_with("45") && prefix.ends_with('-')
}

/// Names a packet: the event for event packets, the packet kind otherwise.
fn envelope_tag(text: &str) -> String {
    let (prefix, rest) = split_prefix(text);
    match prefix {
        "0" => "open".to_string(),
        "1" => "close".to_string(),
        "2" => "ping".to_string(),
        "3" => "pong".to_string(),
        "40" => "connect".to_string(),
        "41" => "disconnect".to_string(),
        p if p.starts_with("42") || is_binary_header(p) => event_name(rest).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Reads the event name from a `["event", ...]` array without parsing the body.
fn event_name(rest: &str) -> Option<String> {
    let rest = rest.trim_start().strip_prefix('[')?.trim_start();
    let mut de = serde_json::Deserializer::from_str(rest).into_iter::<String>();
    de.next()?.ok()
}

fn malformed(tag: &str, err: serde_json::Error) -> OptioError {
    OptioError::MalformedFrame(format!("{tag}: {err}"))
}
