//! Envelope Protocol
//!
//! Three structural shapes share one JSON object:
//!
//! ```text
//! Tell:  { from, to, topic, payload }
//! Ask:   { from, to, topic, payload, replyTo }
//! Reply: { from, to, topic, payload, replyTo, status }
//! ```
//!
//! Classification checks `status` before `replyTo`, since every reply also
//! carries the correlation id of the ask it answers.

use crate::error::ParseError;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Status attached to replies when the caller does not pick one
pub const DEFAULT_REPLY_STATUS: u16 = 200;

/// Length of each random fragment of a correlation id
const CORR_ID_FRAGMENT_LEN: usize = 13;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Structural message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Tell,
    Ask,
    Reply,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Tell => write!(f, "tell"),
            MessageKind::Ask => write!(f, "ask"),
            MessageKind::Reply => write!(f, "reply"),
        }
    }
}

/// Wire envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub from: String,
    pub to: String,
    pub topic: String,
    pub payload: Value,
    #[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl Envelope {
    /// Build a Tell
    pub fn tell(
        from: impl Into<String>,
        to: impl Into<String>,
        topic: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            topic: topic.into(),
            payload,
            reply_to: None,
            status: None,
        }
    }

    /// Turn a Tell into an Ask correlated by `corr_id`, or by a fresh id
    pub fn ask(tell: Envelope, corr_id: Option<String>) -> Self {
        Self {
            reply_to: Some(corr_id.unwrap_or_else(gen_corr_id)),
            status: None,
            ..tell
        }
    }

    /// Build the Reply for `ask`.
    ///
    /// The reply travels back to the asker: `to` and `from` are swapped so
    /// the bus routes it by address like any other frame. The topic and the
    /// correlation id are kept.
    pub fn reply(ask: &Envelope, payload: Value, status: Option<u16>) -> Self {
        Self {
            from: ask.to.clone(),
            to: ask.from.clone(),
            topic: ask.topic.clone(),
            payload,
            reply_to: ask.reply_to.clone(),
            status: Some(status.unwrap_or(DEFAULT_REPLY_STATUS)),
        }
    }

    pub fn kind(&self) -> MessageKind {
        if self.status.is_some() {
            MessageKind::Reply
        } else if self.reply_to.is_some() {
            MessageKind::Ask
        } else {
            MessageKind::Tell
        }
    }

    pub fn is_reply(&self) -> bool {
        self.kind() == MessageKind::Reply
    }

    /// Correlation id carried by an Ask or Reply
    pub fn corr_id(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// Decode the payload into the type a handler expects
    pub fn payload_as<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        P::deserialize(&self.payload)
    }

    /// Serialize to a text frame
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outbound message produced by actor logic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output<P> {
    pub to: String,
    pub topic: String,
    pub payload: P,
}

impl<P: Serialize> Output<P> {
    pub fn new(to: impl Into<String>, topic: impl Into<String>, payload: P) -> Self {
        Self {
            to: to.into(),
            topic: topic.into(),
            payload,
        }
    }

    /// Address the output from `from`. A payload that serializes to null is
    /// rejected since receivers would drop the frame.
    pub fn into_envelope(self, from: &str) -> Result<Envelope, serde_json::Error> {
        let payload = serde_json::to_value(&self.payload)?;
        if payload.is_null() {
            return Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "payload for topic '{}' must not be null",
                self.topic
            )));
        }
        Ok(Envelope::tell(from, self.to, self.topic, payload))
    }
}

/// Validate an inbound text frame
pub fn validate(raw: &str) -> Result<Envelope, ParseError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| ParseError::Json(e.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(ParseError::NotAnObject);
    };

    let to = required_string(&mut fields, "to")?;
    let topic = required_string(&mut fields, "topic")?;
    let payload = match fields.remove("payload") {
        None | Some(Value::Null) => return Err(ParseError::MissingField("payload")),
        Some(payload) => payload,
    };
    let from = optional_string(&mut fields, "from")?.unwrap_or_default();
    let reply_to = optional_string(&mut fields, "replyTo")?;
    let status = match fields.remove("status") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_u64()
                .and_then(|status| u16::try_from(status).ok())
                .ok_or_else(|| ParseError::invalid_field("status", "an integer status code"))?,
        ),
    };

    if status.is_none() && from.is_empty() {
        if let Some(corr_id) = &reply_to {
            return Err(ParseError::MissingSender(corr_id.clone()));
        }
    }

    Ok(Envelope {
        from,
        to,
        topic,
        payload,
        reply_to,
        status,
    })
}

fn required_string(fields: &mut Map<String, Value>, field: &'static str) -> Result<String, ParseError> {
    match fields.remove(field) {
        None | Some(Value::Null) => Err(ParseError::MissingField(field)),
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(_) => Err(ParseError::invalid_field(field, "a non-empty string")),
    }
}

fn optional_string(
    fields: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ParseError> {
    match fields.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ParseError::invalid_field(field, "a string")),
    }
}

/// Random correlation id: two concatenated base-36 fragments
pub fn gen_corr_id() -> String {
    let mut rng = rand::thread_rng();
    (0..CORR_ID_FRAGMENT_LEN * 2)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}
