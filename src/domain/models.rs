//! Domain models for exported Intercom conversations.
//!
//! A `Conversation` is built exactly once from a successfully classified
//! API response body and is immutable afterwards.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{AppError, Result};

/// Kind of message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorKind {
    /// The end user (customer).
    User,
    /// A support admin.
    Admin,
    /// An automated responder.
    Bot,
}

impl AuthorKind {
    /// Map Intercom's author `type` field. Unrecognized kinds (teammates,
    /// workflows) are grouped under `Bot`.
    fn from_api(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "user" | "lead" | "contact" => Self::User,
            "admin" => Self::Admin,
            _ => Self::Bot,
        }
    }
}

impl std::fmt::Display for AuthorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
            Self::Bot => write!(f, "bot"),
        }
    }
}

/// A message author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AuthorKind,
}

/// A single message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub body: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    /// Intercom part type: comment, note, assignment.
    pub part_type: String,
}

impl Message {
    /// Build a message from one conversation part.
    ///
    /// # Errors
    /// Returns a parsing error when `created_at` is absent or malformed.
    fn from_part(data: &Value) -> Result<Self> {
        let author = data.get("author").map_or_else(
            || Author {
                name: String::new(),
                kind: AuthorKind::Bot,
            },
            |a| Author {
                name: a
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind: AuthorKind::from_api(
                    a.get("type").and_then(Value::as_str).unwrap_or_default(),
                ),
            },
        );

        let created_at = data
            .get("created_at")
            .and_then(parse_timestamp)
            .ok_or_else(|| AppError::parsing("message is missing a valid 'created_at'"))?;

        Ok(Self {
            id: field_as_id(data.get("id")).unwrap_or_default(),
            body: data
                .get("body")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            author,
            created_at,
            part_type: data
                .get("part_type")
                .and_then(Value::as_str)
                .unwrap_or("comment")
                .to_string(),
        })
    }
}

/// One exported Intercom conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: Option<String>,
    pub state: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_attributes: serde_json::Map<String, Value>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Build a conversation from an API response body.
    ///
    /// Required fields are `id` and `created_at`; their absence is a parsing
    /// error. Everything else falls back to empty defaults. Conversation
    /// parts without a body, or with malformed timestamps, are skipped with
    /// a warning rather than failing the whole record.
    ///
    /// # Errors
    /// Returns `AppError::Parsing` when `id` or `created_at` is missing or
    /// malformed.
    pub fn from_api_payload(data: &Value) -> Result<Self> {
        let id = field_as_id(data.get("id"))
            .ok_or_else(|| AppError::parsing("conversation is missing 'id'"))?;

        let created_at = data
            .get("created_at")
            .and_then(parse_timestamp)
            .ok_or_else(|| {
                AppError::parsing(format!(
                    "conversation {id} is missing a valid 'created_at'"
                ))
            })?;

        let mut messages = Vec::new();

        // The opening message arrives separately from the parts list.
        if let Some(initial) = data.get("conversation_message") {
            match Message::from_part(initial) {
                Ok(msg) => messages.push(msg),
                Err(e) => tracing::warn!(conversation = %id, error = %e, "Skipping invalid conversation_message"),
            }
        }

        if let Some(parts) = data
            .get("conversation_parts")
            .and_then(|p| p.get("conversation_parts"))
            .and_then(Value::as_array)
        {
            for part in parts {
                let has_body = part
                    .get("body")
                    .and_then(Value::as_str)
                    .is_some_and(|b| !b.is_empty());
                if !has_body {
                    continue;
                }
                match Message::from_part(part) {
                    Ok(msg) => messages.push(msg),
                    Err(e) => tracing::warn!(conversation = %id, error = %e, "Skipping invalid conversation part"),
                }
            }
        }

        messages.sort_by_key(|m| m.created_at);

        Ok(Self {
            id,
            created_at,
            updated_at: data.get("updated_at").and_then(parse_timestamp),
            title: data
                .get("title")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            state: data
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("open")
                .to_string(),
            tags: parse_tags(data.get("tags")),
            custom_attributes: data
                .get("custom_attributes")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            messages,
        })
    }

    /// Get total message count.
    #[must_use]
    pub const fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Count messages by author kind.
    #[must_use]
    pub fn count_by_author(&self, kind: AuthorKind) -> usize {
        self.messages.iter().filter(|m| m.author.kind == kind).count()
    }
}

/// Summary statistics for an export run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportStats {
    pub conversation_count: usize,
    pub total_messages: usize,
    pub user_messages: usize,
    pub admin_messages: usize,
}

impl ExportStats {
    /// Aggregate statistics over a set of conversations.
    #[must_use]
    pub fn collect(conversations: &[Conversation]) -> Self {
        let mut stats = Self {
            conversation_count: conversations.len(),
            ..Self::default()
        };
        for conv in conversations {
            stats.total_messages += conv.message_count();
            stats.user_messages += conv.count_by_author(AuthorKind::User);
            stats.admin_messages += conv.count_by_author(AuthorKind::Admin);
        }
        stats
    }
}

/// Intercom sends ids as strings in most payloads but as bare numbers in a
/// few legacy shapes; accept both.
pub(crate) fn field_as_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a timestamp that is either unix seconds or an RFC 3339 string.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_opt(n.as_i64()?, 0).single(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// Tags arrive either as a plain list of names or as `{"tags": [{"name": ..}]}`.
fn parse_tags(value: Option<&Value>) -> Vec<String> {
    let list = match value {
        Some(Value::Array(items)) => items.as_slice(),
        Some(Value::Object(obj)) => match obj.get("tags").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    list.iter()
        .filter_map(|tag| match tag {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj
                .get("name")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_payload_parses_with_empty_defaults() {
        let payload = json!({"id": "123", "created_at": "2023-01-01T12:00:00Z"});
        let conv = Conversation::from_api_payload(&payload).unwrap();

        assert_eq!(conv.id, "123");
        assert_eq!(conv.created_at.to_rfc3339(), "2023-01-01T12:00:00+00:00");
        assert!(conv.messages.is_empty());
        assert!(conv.tags.is_empty());
        assert!(conv.custom_attributes.is_empty());
        assert_eq!(conv.state, "open");
    }

    #[test]
    fn test_missing_id_is_parsing_error() {
        let payload = json!({"created_at": 1672567200});
        let err = Conversation::from_api_payload(&payload).unwrap_err();
        assert!(matches!(err, AppError::Parsing { .. }));
    }

    #[test]
    fn test_missing_created_at_is_parsing_error() {
        let payload = json!({"id": "123"});
        let err = Conversation::from_api_payload(&payload).unwrap_err();
        assert!(matches!(err, AppError::Parsing { .. }));
    }

    #[test]
    fn test_numeric_id_and_epoch_timestamp() {
        let payload = json!({"id": 123_456, "created_at": 1_672_567_200});
        let conv = Conversation::from_api_payload(&payload).unwrap();
        assert_eq!(conv.id, "123456");
        assert_eq!(conv.created_at.timestamp(), 1_672_567_200);
    }

    #[test]
    fn test_messages_assembled_and_sorted() {
        let payload = json!({
            "id": "123456",
            "created_at": 1_672_567_200,
            "updated_at": 1_672_567_500,
            "state": "open",
            "conversation_message": {
                "id": "msg1",
                "body": "Initial message",
                "author": {"id": "user1", "name": "John Doe", "type": "user"},
                "created_at": 1_672_567_200
            },
            "conversation_parts": {
                "conversation_parts": [
                    {
                        "id": "msg2",
                        "body": "Response message",
                        "author": {"id": "admin1", "name": "Support Agent", "type": "admin"},
                        "created_at": 1_672_567_500,
                        "part_type": "comment"
                    },
                    {"id": "msg3", "body": "", "created_at": 1_672_567_600}
                ]
            }
        });

        let conv = Conversation::from_api_payload(&payload).unwrap();
        assert_eq!(conv.message_count(), 2);
        assert_eq!(conv.messages[0].body, "Initial message");
        assert_eq!(conv.messages[0].author.kind, AuthorKind::User);
        assert_eq!(conv.messages[1].author.kind, AuthorKind::Admin);
        assert_eq!(conv.count_by_author(AuthorKind::User), 1);
    }

    #[test]
    fn test_tags_accept_both_shapes() {
        let nested = json!({
            "id": "1",
            "created_at": 1,
            "tags": {"tags": [{"name": "billing"}, {"name": "urgent"}]}
        });
        let flat = json!({"id": "2", "created_at": 1, "tags": ["billing", "urgent"]});

        let conv = Conversation::from_api_payload(&nested).unwrap();
        assert_eq!(conv.tags, vec!["billing", "urgent"]);
        let conv = Conversation::from_api_payload(&flat).unwrap();
        assert_eq!(conv.tags, vec!["billing", "urgent"]);
    }

    #[test]
    fn test_unknown_author_kind_maps_to_bot() {
        assert_eq!(AuthorKind::from_api("workflow"), AuthorKind::Bot);
        assert_eq!(AuthorKind::from_api("Admin"), AuthorKind::Admin);
        assert_eq!(AuthorKind::from_api("lead"), AuthorKind::User);
    }

    #[test]
    fn test_stats_collect() {
        let payload = json!({
            "id": "1",
            "created_at": 1,
            "conversation_message": {
                "body": "hi",
                "author": {"name": "A", "type": "user"},
                "created_at": 1
            }
        });
        let conv = Conversation::from_api_payload(&payload).unwrap();
        let stats = ExportStats::collect(std::slice::from_ref(&conv));
        assert_eq!(stats.conversation_count, 1);
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.admin_messages, 0);
    }
}
