use crate::events::{DomainEvent, EventKind};
use crate::{Error, Result};
use serde::Deserialize;

/// Header carrying the event type name on every record.
pub const MESSAGE_TYPE_HEADER: &str = "message-type";
/// Header explaining why a record was sent to the dead-letter topic.
pub const DEAD_LETTER_REASON_HEADER: &str = "dlq-reason";
/// Header recording `topic/partition/offset` of a dead-lettered record.
pub const DEAD_LETTER_ORIGIN_HEADER: &str = "dlq-origin";

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedEvent {
    /// Question id; keeps all events of one question on one partition.
    pub key: String,
    pub message_type: &'static str,
    pub payload: Vec<u8>,
}

#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub struct JsonSerializer;

impl JsonSerializer {
    pub fn encode(event: &DomainEvent) -> Result<EncodedEvent> {
        Ok(EncodedEvent {
            key: event.question_id().to_string(),
            message_type: event.kind().as_str(),
            payload: serde_json::to_vec(event)?,
        })
    }

    /// Routes by the `message-type` header, falling back to the payload's
    /// own `type` field for producers that don't set headers.
    pub fn decode(message_type: Option<&str>, payload: &[u8]) -> Result<DomainEvent> {
        let kind: EventKind = match message_type {
            Some(name) => name.parse()?,
            None => {
                let tag: TypeTag = serde_json::from_slice(payload)?;
                match tag.kind {
                    Some(name) => name.parse()?,
                    None => {
                        return Err(Error::InvalidMessage {
                            message: "no message-type header and no type field".to_string(),
                        })
                    }
                }
            }
        };
        kind.decode(payload)
    }
}
