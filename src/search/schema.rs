//! Index settings, analyzers and field mappings

use crate::search::config::SearchConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Document field paths
pub mod fields {
    pub const CHAT_ID: &str = "chatID";
    pub const MESSAGE_ID: &str = "messageID";
    pub const CHAT_TYPE: &str = "chatType";
    pub const CHAT_TITLE: &str = "chatTitle";
    pub const TEXT: &str = "text";
    pub const CAPTION: &str = "caption";
    pub const TEXT_EXACT: &str = "text.exact";
    pub const CAPTION_EXACT: &str = "caption.exact";
    pub const SENDER_TYPE: &str = "senderType";
    pub const SENDER_ID: &str = "senderID";
    pub const SENDER_NAME: &str = "senderName";
    pub const SENDER_USERNAME: &str = "senderUsername";
    pub const SENDER_FIRST_NAME: &str = "senderFirstName";
    pub const SENDER_LAST_NAME: &str = "senderLastName";
    pub const SENDER_CHAT_TITLE: &str = "senderChatTitle";
    pub const IS_FORWARDED: &str = "isForwarded";
    pub const FORWARD_FROM_TYPE: &str = "forwardFromType";
    pub const FORWARD_FROM_ID: &str = "forwardFromID";
    pub const FORWARD_FROM_NAME: &str = "forwardFromName";
    pub const FORWARD_TIMESTAMP: &str = "forwardTimestamp";
    pub const CONTENT_TYPE: &str = "contentType";
    pub const REPLY_TO_MESSAGE_ID: &str = "replyToMessageID";
    pub const ENTITIES: &str = "entities";
    pub const ENTITY_TYPE: &str = "entities.type";
    pub const ENTITY_USER_ID: &str = "entities.userID";
    pub const IS_DELETED: &str = "isDeleted";
    pub const DELETED_AT: &str = "deletedAt";
    pub const TIMESTAMP: &str = "timestamp";
    pub const EDIT_TIMESTAMP: &str = "editTimestamp";

    pub const LEGACY_CHAT: &str = "chat";
    pub const LEGACY_CHAT_ID: &str = "chat.id";
    pub const LEGACY_CHAT_TYPE: &str = "chat.type";
    pub const LEGACY_FROM: &str = "from";
    pub const LEGACY_FROM_ID: &str = "from.id";
    pub const LEGACY_FROM_USERNAME: &str = "from.username";
}

/// Bigram analyzer for CJK text
pub const FUZZY_ANALYZER: &str = "cjk_fuzzy";

/// Whole-value analyzer backing the `exact` sub-fields
pub const EXACT_ANALYZER: &str = "exact_lowercase";

/// Name of the `exact` sub-field under analyzed text fields
pub const EXACT_SUBFIELD: &str = "exact";

pub const LOWERCASE_NORMALIZER: &str = "lowercase_keyword";

/// Keyword fields compared case-insensitively
pub const NORMALIZED_KEYWORDS: [&str; 4] = [
    fields::CHAT_TYPE,
    fields::SENDER_USERNAME,
    fields::LEGACY_CHAT_TYPE,
    fields::LEGACY_FROM_USERNAME,
];

/// Fields analyzed with the bigram analyzer, each carrying an `exact` sub-field
pub const ANALYZED_FIELDS: [&str; 5] = [
    fields::TEXT,
    fields::CAPTION,
    fields::CHAT_TITLE,
    fields::SENDER_NAME,
    fields::FORWARD_FROM_NAME,
];

/// Which field-path layout documents and queries use.
///
/// `Transitional` writes legacy nested mirrors next to the flattened fields and
/// OR-combines both paths in filters. Once every document has been reindexed,
/// `Current` drops the mirrors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaGeneration {
    Legacy,
    #[default]
    Transitional,
    Current,
}

/// Filterable fields that exist both flattened and as legacy nested paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirroredField {
    ChatId,
    ChatType,
    SenderId,
    SenderUsername,
}

impl MirroredField {
    pub fn current_path(self) -> &'static str {
        match self {
            MirroredField::ChatId => fields::CHAT_ID,
            MirroredField::ChatType => fields::CHAT_TYPE,
            MirroredField::SenderId => fields::SENDER_ID,
            MirroredField::SenderUsername => fields::SENDER_USERNAME,
        }
    }

    pub fn legacy_path(self) -> &'static str {
        match self {
            MirroredField::ChatId => fields::LEGACY_CHAT_ID,
            MirroredField::ChatType => fields::LEGACY_CHAT_TYPE,
            MirroredField::SenderId => fields::LEGACY_FROM_ID,
            MirroredField::SenderUsername => fields::LEGACY_FROM_USERNAME,
        }
    }
}

impl SchemaGeneration {
    /// Paths a filter on `field` must consult
    pub fn paths(self, field: MirroredField) -> Vec<&'static str> {
        match self {
            SchemaGeneration::Legacy => vec![field.legacy_path()],
            SchemaGeneration::Transitional => vec![field.current_path(), field.legacy_path()],
            SchemaGeneration::Current => vec![field.current_path()],
        }
    }

    /// Whether written documents carry the legacy nested mirrors
    pub fn writes_legacy_mirrors(self) -> bool {
        !matches!(self, SchemaGeneration::Current)
    }
}

fn analyzed_text() -> Value {
    json!({
        "type": "text",
        "analyzer": FUZZY_ANALYZER,
        "fields": {
            EXACT_SUBFIELD: {
                "type": "text",
                "analyzer": EXACT_ANALYZER
            }
        }
    })
}

fn keyword() -> Value {
    json!({ "type": "keyword" })
}

fn normalized_keyword() -> Value {
    json!({ "type": "keyword", "normalizer": LOWERCASE_NORMALIZER })
}

fn long() -> Value {
    json!({ "type": "long" })
}

fn epoch_seconds() -> Value {
    json!({ "type": "date", "format": "epoch_second" })
}

/// Analysis settings shared by every generation of the index
pub fn analysis_settings() -> Value {
    json!({
        "analyzer": {
            FUZZY_ANALYZER: {
                "type": "custom",
                "tokenizer": "standard",
                "filter": ["cjk_width", "lowercase", "cjk_bigram"]
            },
            EXACT_ANALYZER: {
                "type": "custom",
                "tokenizer": "keyword",
                "filter": ["lowercase"]
            }
        },
        "normalizer": {
            LOWERCASE_NORMALIZER: {
                "type": "custom",
                "filter": ["lowercase"]
            }
        }
    })
}

/// Field mappings of the message index
pub fn mappings() -> Value {
    json!({
        "dynamic": false,
        "properties": {
            "id": keyword(),
            fields::CHAT_ID: long(),
            fields::MESSAGE_ID: long(),
            fields::CHAT_TYPE: normalized_keyword(),
            fields::CHAT_TITLE: analyzed_text(),
            fields::TEXT: analyzed_text(),
            fields::CAPTION: analyzed_text(),
            fields::SENDER_TYPE: keyword(),
            fields::SENDER_ID: long(),
            fields::SENDER_NAME: analyzed_text(),
            fields::SENDER_USERNAME: normalized_keyword(),
            fields::SENDER_FIRST_NAME: keyword(),
            fields::SENDER_LAST_NAME: keyword(),
            fields::SENDER_CHAT_TITLE: keyword(),
            fields::IS_FORWARDED: { "type": "boolean" },
            fields::FORWARD_FROM_TYPE: keyword(),
            fields::FORWARD_FROM_ID: long(),
            fields::FORWARD_FROM_NAME: analyzed_text(),
            fields::FORWARD_TIMESTAMP: epoch_seconds(),
            fields::CONTENT_TYPE: keyword(),
            "fileID": { "type": "keyword", "index": false },
            "fileName": keyword(),
            "mimeType": keyword(),
            "fileSize": long(),
            "duration": long(),
            "width": long(),
            "height": long(),
            "stickerEmoji": keyword(),
            "stickerSetName": keyword(),
            fields::REPLY_TO_MESSAGE_ID: long(),
            fields::ENTITIES: {
                "type": "nested",
                "properties": {
                    "type": keyword(),
                    "offset": { "type": "integer" },
                    "length": { "type": "integer" },
                    "userID": long()
                }
            },
            fields::IS_DELETED: { "type": "boolean" },
            fields::DELETED_AT: epoch_seconds(),
            fields::TIMESTAMP: epoch_seconds(),
            fields::EDIT_TIMESTAMP: epoch_seconds(),
            fields::LEGACY_CHAT: {
                "properties": {
                    "id": long(),
                    "type": normalized_keyword(),
                    "title": analyzed_text()
                }
            },
            fields::LEGACY_FROM: {
                "properties": {
                    "id": long(),
                    "username": normalized_keyword(),
                    "firstName": keyword(),
                    "lastName": keyword()
                }
            }
        }
    })
}

/// Full create-index body
pub fn index_definition(config: &SearchConfig) -> Value {
    json!({
        "settings": {
            "number_of_shards": config.number_of_shards,
            "number_of_replicas": config.number_of_replicas,
            "max_result_window": config.max_result_window,
            "analysis": analysis_settings()
        },
        "mappings": mappings()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_fields_carry_exact_subfield() {
        let mappings = mappings();
        for field in ANALYZED_FIELDS {
            let mapping = &mappings["properties"][field];
            assert_eq!(mapping["analyzer"], FUZZY_ANALYZER, "{field}");
            assert_eq!(
                mapping["fields"][EXACT_SUBFIELD]["analyzer"],
                EXACT_ANALYZER,
                "{field}"
            );
        }
    }

    #[test]
    fn test_entities_are_nested() {
        assert_eq!(mappings()["properties"]["entities"]["type"], "nested");
    }

    #[test]
    fn test_bigram_analyzer_chain() {
        let analysis = analysis_settings();
        let analyzer = &analysis["analyzer"][FUZZY_ANALYZER];
        assert_eq!(analyzer["tokenizer"], "standard");
        assert_eq!(analyzer["filter"], json!(["cjk_width", "lowercase", "cjk_bigram"]));
        assert_eq!(analysis["analyzer"][EXACT_ANALYZER]["tokenizer"], "keyword");
    }

    #[test]
    fn test_generation_paths() {
        assert_eq!(
            SchemaGeneration::Transitional.paths(MirroredField::SenderUsername),
            vec!["senderUsername", "from.username"]
        );
        assert_eq!(
            SchemaGeneration::Current.paths(MirroredField::ChatId),
            vec!["chatID"]
        );
        assert_eq!(
            SchemaGeneration::Legacy.paths(MirroredField::SenderId),
            vec!["from.id"]
        );
        assert!(!SchemaGeneration::Current.writes_legacy_mirrors());
    }

    #[test]
    fn test_index_definition_uses_config() {
        let config = SearchConfig {
            number_of_shards: 3,
            number_of_replicas: 2,
            ..Default::default()
        };
        let definition = index_definition(&config);
        assert_eq!(definition["settings"]["number_of_shards"], 3);
        assert_eq!(definition["settings"]["number_of_replicas"], 2);
    }
}
