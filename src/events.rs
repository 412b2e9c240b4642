//! Domain events exchanged between the question service and its consumers.
//!
//! Every event carries all fields a consumer needs to update its projection,
//! so no handler ever has to query the question store. Events serialize as
//! self-describing JSON objects tagged with their type name:
//!
//! ```json
//! {"type":"AnswerCountUpdated","questionId":"q1","answerCount":3}
//! ```
//!
//! Consumers ignore fields they don't know, so adding a field is
//! backward compatible. Removing or repurposing one needs a new event type.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCreated {
    #[serde(alias = "id")]
    pub question_id: String,
    pub title: String,
    pub content: String,
    #[serde(alias = "created")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "nullable_tags")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionUpdated {
    #[serde(alias = "id")]
    pub question_id: String,
    pub title: String,
    pub content: String,
    #[serde(default, deserialize_with = "nullable_tags")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDeleted {
    #[serde(alias = "id")]
    pub question_id: String,
}

/// Carries the absolute answer count, never a delta, so redelivery is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCountUpdated {
    #[serde(alias = "id")]
    pub question_id: String,
    pub answer_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerAccepted {
    #[serde(alias = "id")]
    pub question_id: String,
}

/// Absent and `null` tags both mean "no tags".
fn nullable_tags<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One variant per kind of mutation in the question store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    QuestionCreated(QuestionCreated),
    QuestionUpdated(QuestionUpdated),
    QuestionDeleted(QuestionDeleted),
    AnswerCountUpdated(AnswerCountUpdated),
    AnswerAccepted(AnswerAccepted),
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::QuestionCreated(_) => EventKind::QuestionCreated,
            DomainEvent::QuestionUpdated(_) => EventKind::QuestionUpdated,
            DomainEvent::QuestionDeleted(_) => EventKind::QuestionDeleted,
            DomainEvent::AnswerCountUpdated(_) => EventKind::AnswerCountUpdated,
            DomainEvent::AnswerAccepted(_) => EventKind::AnswerAccepted,
        }
    }

    /// The question this event belongs to. Used as the record key.
    pub fn question_id(&self) -> &str {
        match self {
            DomainEvent::QuestionCreated(e) => &e.question_id,
            DomainEvent::QuestionUpdated(e) => &e.question_id,
            DomainEvent::QuestionDeleted(e) => &e.question_id,
            DomainEvent::AnswerCountUpdated(e) => &e.question_id,
            DomainEvent::AnswerAccepted(e) => &e.question_id,
        }
    }
}

/// Type tag of a [`DomainEvent`], as carried in message metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    QuestionCreated,
    QuestionUpdated,
    QuestionDeleted,
    AnswerCountUpdated,
    AnswerAccepted,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::QuestionCreated,
        EventKind::QuestionUpdated,
        EventKind::QuestionDeleted,
        EventKind::AnswerCountUpdated,
        EventKind::AnswerAccepted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::QuestionCreated => "QuestionCreated",
            EventKind::QuestionUpdated => "QuestionUpdated",
            EventKind::QuestionDeleted => "QuestionDeleted",
            EventKind::AnswerCountUpdated => "AnswerCountUpdated",
            EventKind::AnswerAccepted => "AnswerAccepted",
        }
    }

    /// Decodes a payload known to hold an event of this kind.
    ///
    /// The payload's own `type` field, if any, is ignored along with every
    /// other field the event doesn't define.
    pub fn decode(&self, payload: &[u8]) -> Result<DomainEvent> {
        let event = match self {
            EventKind::QuestionCreated => {
                DomainEvent::QuestionCreated(serde_json::from_slice(payload)?)
            }
            EventKind::QuestionUpdated => {
                DomainEvent::QuestionUpdated(serde_json::from_slice(payload)?)
            }
            EventKind::QuestionDeleted => {
                DomainEvent::QuestionDeleted(serde_json::from_slice(payload)?)
            }
            EventKind::AnswerCountUpdated => {
                DomainEvent::AnswerCountUpdated(serde_json::from_slice(payload)?)
            }
            EventKind::AnswerAccepted => {
                DomainEvent::AnswerAccepted(serde_json::from_slice(payload)?)
            }
        };
        Ok(event)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownEventType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tagged_serialization() {
        let event = DomainEvent::AnswerCountUpdated(AnswerCountUpdated {
            question_id: "q1".to_string(),
            answer_count: 3,
        });

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AnswerCountUpdated");
        assert_eq!(json["questionId"], "q1");
        assert_eq!(json["answerCount"], 3);
    }

    #[test]
    fn test_decode_tolerates_unknown_and_missing_optional_fields() {
        let payload = br#"{
            "questionId": "q1",
            "title": "T",
            "content": "c",
            "createdAt": "2024-05-01T10:00:00Z",
            "askerId": "someone",
            "viewCount": 12
        }"#;

        let event = EventKind::QuestionCreated.decode(payload).unwrap();
        match event {
            DomainEvent::QuestionCreated(e) => {
                assert_eq!(e.question_id, "q1");
                assert!(e.tags.is_empty());
                assert_eq!(
                    e.created_at,
                    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_treats_null_tags_as_empty() {
        let event = EventKind::QuestionCreated
            .decode(br#"{"questionId":"q1","title":"T","content":"c","createdAt":"2024-01-01T00:00:00Z","tags":null}"#)
            .unwrap();
        match event {
            DomainEvent::QuestionCreated(e) => assert!(e.tags.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }

        let event = EventKind::QuestionUpdated
            .decode(br#"{"questionId":"q1","title":"T","content":"c","tags":null}"#)
            .unwrap();
        match event {
            DomainEvent::QuestionUpdated(e) => assert!(e.tags.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_accepts_id_aliases() {
        let event = EventKind::QuestionDeleted
            .decode(br#"{"id":"q9"}"#)
            .unwrap();
        assert_eq!(event.question_id(), "q9");

        let event = EventKind::QuestionCreated
            .decode(br#"{"id":"q2","title":"t","content":"c","created":"2024-01-01T00:00:00Z","tags":["rust"]}"#)
            .unwrap();
        assert_eq!(event.question_id(), "q2");
        assert_eq!(event.kind(), EventKind::QuestionCreated);
    }

    #[test]
    fn test_decode_rejects_missing_required_field() {
        let result = EventKind::AnswerCountUpdated.decode(br#"{"questionId":"q1"}"#);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_kind_parsing() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }

        let err = "AnswerUnaccepted".parse::<EventKind>().unwrap_err();
        assert!(matches!(err, Error::UnknownEventType(name) if name == "AnswerUnaccepted"));
    }

    #[test]
    fn test_self_describing_payload_round_trips_through_kind() {
        let event = DomainEvent::QuestionUpdated(QuestionUpdated {
            question_id: "q1".to_string(),
            title: "T2".to_string(),
            content: "<p>c</p>".to_string(),
            tags: vec!["go".to_string()],
        });

        let payload = serde_json::to_vec(&event).unwrap();
        let decoded = event.kind().decode(&payload).unwrap();
        assert_eq!(decoded, event);
    }
}
