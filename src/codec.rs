//! Relay frame decoding and subscription encoding (NIP-01 subset).

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::event::Event;

/// Default event kind for filter updates (parameterized replaceable).
pub const DEFAULT_KIND: u32 = 30078;
/// Default topic discriminator tag key.
pub const DEFAULT_TOPIC_TAG: &str = "d";
/// Default topic value.
pub const DEFAULT_TOPIC: &str = "adablock-filters";

/// The single logical document a client follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    /// Discriminator tag key, `d` for replaceable parameterized events.
    pub tag_key: String,
    /// Discriminator value identifying the document.
    pub topic: String,
    /// Accepted event kind.
    pub kind: u32,
    /// Authorized signer keys (hex). Empty means any signer.
    pub authorized_signers: Vec<String>,
}

impl Default for TopicFilter {
    fn default() -> Self {
        Self {
            tag_key: DEFAULT_TOPIC_TAG.into(),
            topic: DEFAULT_TOPIC.into(),
            kind: DEFAULT_KIND,
            authorized_signers: Vec::new(),
        }
    }
}

impl TopicFilter {
    pub fn new(topic: impl Into<String>, kind: u32) -> Self {
        Self {
            topic: topic.into(),
            kind,
            ..Self::default()
        }
    }

    pub fn with_signers(mut self, signers: Vec<String>) -> Self {
        self.authorized_signers = signers;
        self
    }
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame is not valid JSON")]
    NotJson,
    #[error("frame is not a JSON array")]
    NotArray,
    #[error("frame type is missing or not a string")]
    MissingType,
    #[error("malformed {0} frame")]
    Shape(&'static str),
    #[error("malformed event: {0}")]
    Event(String),
}

/// Messages a relay may send to this client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <sub>, <event>]`
    Event {
        subscription_id: String,
        event: Box<Event>,
    },
    /// `["EOSE", <sub>]`
    EndOfStoredEvents(String),
    /// `["NOTICE", <message>]`
    Notice(String),
    /// Any other well-formed frame type (`OK`, `AUTH`, `CLOSED`, ...).
    Unknown(String),
}

impl RelayMessage {
    /// Decode a text frame received from a relay.
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let val: Value = serde_json::from_str(frame).map_err(|_| DecodeError::NotJson)?;
        let arr = val.as_array().ok_or(DecodeError::NotArray)?;
        let kind = arr
            .first()
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?;
        match kind {
            "EVENT" => {
                let [_, sub, ev] = arr.as_slice() else {
                    return Err(DecodeError::Shape("EVENT"));
                };
                let sub = sub.as_str().ok_or(DecodeError::Shape("EVENT"))?;
                if !ev.is_object() {
                    return Err(DecodeError::Shape("EVENT"));
                }
                let event = serde_json::from_value::<Event>(ev.clone())
                    .map_err(|e| DecodeError::Event(e.to_string()))?;
                Ok(RelayMessage::Event {
                    subscription_id: sub.to_string(),
                    event: Box::new(event),
                })
            }
            "EOSE" => match arr.as_slice() {
                [_, Value::String(sub)] => Ok(RelayMessage::EndOfStoredEvents(sub.clone())),
                _ => Err(DecodeError::Shape("EOSE")),
            },
            "NOTICE" => match arr.as_slice() {
                [_, Value::String(msg)] => Ok(RelayMessage::Notice(msg.clone())),
                _ => Err(DecodeError::Shape("NOTICE")),
            },
            other => Ok(RelayMessage::Unknown(other.to_string())),
        }
    }
}

/// Build the `["REQ", <sub>, <filter>]` frame for `topic`.
pub fn subscription_request(topic: &TopicFilter, subscription_id: &str) -> String {
    let mut filter = Map::new();
    filter.insert("kinds".into(), json!([topic.kind]));
    filter.insert(format!("#{}", topic.tag_key), json!([topic.topic]));
    filter.insert("limit".into(), json!(1));
    if !topic.authorized_signers.is_empty() {
        filter.insert(
            "authors".into(),
            Value::Array(
                topic
                    .authorized_signers
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
    }
    json!(["REQ", subscription_id, Value::Object(filter)]).to_string()
}
