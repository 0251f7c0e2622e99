//! Conversion between messages and stored index documents

use crate::models::{Message, Sender};
use crate::search::error::{SearchError, SearchResult};
use crate::search::schema::{fields, SchemaGeneration};
use serde_json::{json, Map, Value};

/// Types that can be written to the message index
pub trait SearchDocument {
    /// Stable document id
    fn document_id(&self) -> String;

    /// Stored `_source` for the given schema generation
    fn to_source(&self, generation: SchemaGeneration) -> SearchResult<Value>;
}

impl SearchDocument for Message {
    fn document_id(&self) -> String {
        self.id.clone()
    }

    fn to_source(&self, generation: SchemaGeneration) -> SearchResult<Value> {
        let mut source = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => {
                return Err(SearchError::IndexingFailed(format!(
                    "message {} did not serialize to an object",
                    self.id
                )))
            }
        };

        if let Some(chat_type) = &self.chat_type {
            source.insert(fields::CHAT_TYPE.to_string(), json!(chat_type.to_lowercase()));
        }

        if generation.writes_legacy_mirrors() {
            source.insert(fields::LEGACY_CHAT.to_string(), legacy_chat(self));
            source.insert(fields::LEGACY_FROM.to_string(), legacy_from(&self.sender));
        }

        Ok(Value::Object(source))
    }
}

fn legacy_chat(message: &Message) -> Value {
    let mut chat = Map::new();
    chat.insert("id".to_string(), json!(message.chat_id));
    if let Some(chat_type) = &message.chat_type {
        chat.insert("type".to_string(), json!(chat_type.to_lowercase()));
    }
    if let Some(title) = &message.chat_title {
        chat.insert("title".to_string(), json!(title));
    }
    Value::Object(chat)
}

fn legacy_from(sender: &Sender) -> Value {
    let mut from = Map::new();
    from.insert("id".to_string(), json!(sender.id()));
    if let Some(username) = sender.username() {
        from.insert("username".to_string(), json!(username));
    }
    if let Sender::User {
        first_name,
        last_name,
        ..
    } = sender
    {
        if let Some(first) = first_name {
            from.insert("firstName".to_string(), json!(first));
        }
        if let Some(last) = last_name {
            from.insert("lastName".to_string(), json!(last));
        }
    }
    Value::Object(from)
}

/// Rebuild a message from a stored `_source`.
///
/// Documents written before the flattened layout only carry `chat`/`from`;
/// the flattened fields are filled in from those mirrors.
pub fn message_from_source(id: &str, source: &Value) -> SearchResult<Message> {
    let mut source = match source {
        Value::Object(map) => map.clone(),
        other => {
            return Err(SearchError::MalformedResponse(format!(
                "document {} has non-object source: {}",
                id, other
            )))
        }
    };

    backfill_from_legacy(&mut source);
    source.remove(fields::LEGACY_CHAT);
    source.remove(fields::LEGACY_FROM);
    if !source.contains_key("id") {
        source.insert("id".to_string(), json!(id));
    }

    serde_json::from_value(Value::Object(source))
        .map_err(|e| SearchError::MalformedResponse(format!("document {}: {}", id, e)))
}

fn backfill_from_legacy(source: &mut Map<String, Value>) {
    let chat = source.get(fields::LEGACY_CHAT).cloned().unwrap_or(Value::Null);
    let from = source.get(fields::LEGACY_FROM).cloned().unwrap_or(Value::Null);

    let mut fill = |key: &str, value: &Value| {
        if !value.is_null() && !source.contains_key(key) {
            source.insert(key.to_string(), value.clone());
        }
    };

    fill(fields::CHAT_ID, &chat["id"]);
    fill(fields::CHAT_TYPE, &chat["type"]);
    fill(fields::CHAT_TITLE, &chat["title"]);

    if !from.is_null() {
        fill(fields::SENDER_TYPE, &json!("user"));
        fill(fields::SENDER_ID, &from["id"]);
        fill(fields::SENDER_USERNAME, &from["username"]);
        fill(fields::SENDER_FIRST_NAME, &from["firstName"]);
        fill(fields::SENDER_LAST_NAME, &from["lastName"]);

        let name = [from["firstName"].as_str(), from["lastName"].as_str()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            fill(fields::SENDER_NAME, &json!(name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, MessageEntity};

    fn sample() -> Message {
        Message::new(
            -1001,
            42,
            Sender::User {
                id: 7,
                name: "Alice Chen".to_string(),
                username: Some("alice".to_string()),
                first_name: Some("Alice".to_string()),
                last_name: Some("Chen".to_string()),
            },
            1_700_000_000,
        )
        .with_chat("SuperGroup", Some("Rustaceans".to_string()))
        .with_caption(ContentType::Photo, "猫の写真")
        .with_entity(MessageEntity::hashtag(0, 2))
    }

    #[test]
    fn test_transitional_source_carries_mirrors() {
        let source = sample().to_source(SchemaGeneration::Transitional).unwrap();
        assert_eq!(source["id"], "-1001-42");
        assert_eq!(source["chatType"], "supergroup");
        assert_eq!(source["chat"]["id"], -1001);
        assert_eq!(source["chat"]["type"], "supergroup");
        assert_eq!(source["from"]["username"], "alice");
        assert_eq!(source["from"]["lastName"], "Chen");
        assert_eq!(source["contentType"], "photo");
    }

    #[test]
    fn test_current_source_drops_mirrors() {
        let source = sample().to_source(SchemaGeneration::Current).unwrap();
        assert!(source.get("chat").is_none());
        assert!(source.get("from").is_none());
        assert_eq!(source["senderUsername"], "alice");
    }

    #[test]
    fn test_source_roundtrip() {
        let message = sample();
        let source = message.to_source(SchemaGeneration::Transitional).unwrap();
        let restored = message_from_source(&message.id, &source).unwrap();
        assert_eq!(restored.caption.as_deref(), Some("猫の写真"));
        assert_eq!(restored.sender, message.sender);
        assert_eq!(restored.entities, message.entities);
    }

    #[test]
    fn test_legacy_only_document_is_backfilled() {
        let source = json!({
            "chatID": 5,
            "messageID": 9,
            "text": "old",
            "timestamp": 1,
            "chat": {"id": 5, "type": "group"},
            "from": {"id": 3, "username": "bob", "firstName": "Bob"}
        });
        let message = message_from_source("5-9", &source).unwrap();
        assert_eq!(message.id, "5-9");
        assert_eq!(message.chat_type.as_deref(), Some("group"));
        assert_eq!(message.sender_id(), 3);
        assert_eq!(message.sender.name(), "Bob");
        assert_eq!(message.sender.username(), Some("bob"));
    }
}
