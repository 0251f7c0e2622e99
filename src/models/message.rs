use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

/// Entity types that count as a mention of another user
pub const MENTION_ENTITY_TYPES: [&str; 2] = ["mention", "text_mention"];

/// Entity type carrying a resolved `userID`
pub const TEXT_MENTION_ENTITY_TYPE: &str = "text_mention";

/// A chat message as received from collectors and persisted in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Composite key `"{chatID}-{messageID}"`
    #[serde(default)]
    #[validate(length(min = 1, message = "message id is required"))]
    pub id: String,

    #[serde(rename = "chatID")]
    pub chat_id: i64,

    #[serde(rename = "messageID")]
    pub message_id: i64,

    /// private, group, supergroup or channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_title: Option<String>,

    /// Body of a text message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Body of a media message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Who sent the message
    #[serde(flatten)]
    pub sender: Sender,

    /// Forward provenance
    #[serde(flatten)]
    pub forward: ForwardInfo,

    #[serde(default)]
    pub content_type: ContentType,

    /// Type-specific media attributes
    #[serde(flatten)]
    pub media: MediaInfo,

    #[serde(
        default,
        rename = "replyToMessageID",
        skip_serializing_if = "Option::is_none"
    )]
    pub reply_to_message_id: Option<i64>,

    /// Mention/hashtag spans, in message order
    #[serde(default)]
    pub entities: Vec<MessageEntity>,

    #[serde(default)]
    pub is_deleted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,

    /// Unix seconds
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_timestamp: Option<i64>,
}

impl Message {
    /// Create a message with an empty body
    pub fn new(chat_id: i64, message_id: i64, sender: Sender, timestamp: i64) -> Self {
        Self {
            id: Self::composite_id(chat_id, message_id),
            chat_id,
            message_id,
            chat_type: None,
            chat_title: None,
            text: None,
            caption: None,
            sender,
            forward: ForwardInfo::default(),
            content_type: ContentType::Text,
            media: MediaInfo::default(),
            reply_to_message_id: None,
            entities: Vec::new(),
            is_deleted: false,
            deleted_at: None,
            timestamp,
            edit_timestamp: None,
        }
    }

    /// Document id for a `(chatID, messageID)` pair
    pub fn composite_id(chat_id: i64, message_id: i64) -> String {
        format!("{}-{}", chat_id, message_id)
    }

    /// Whether `id` matches the composite of `chat_id` and `message_id`
    pub fn has_composite_id(&self) -> bool {
        self.id == Self::composite_id(self.chat_id, self.message_id)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self.caption = None;
        self.content_type = ContentType::Text;
        self
    }

    pub fn with_caption(mut self, content_type: ContentType, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self.text = None;
        self.content_type = content_type;
        self
    }

    pub fn with_chat(mut self, chat_type: impl Into<String>, title: Option<String>) -> Self {
        self.chat_type = Some(chat_type.into());
        self.chat_title = title;
        self
    }

    pub fn with_entity(mut self, entity: MessageEntity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_forward(mut self, forward: ForwardInfo) -> Self {
        self.forward = forward;
        self
    }

    pub fn sender_id(&self) -> i64 {
        self.sender.id()
    }

    /// Searchable body, whichever slot is populated
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// Cross-field checks that the derive cannot express
    pub fn check_consistency(&self) -> Result<(), String> {
        if !self.has_composite_id() {
            return Err(format!(
                "message id {:?} does not match composite key {:?}",
                self.id,
                Self::composite_id(self.chat_id, self.message_id)
            ));
        }
        if self.text.is_some() && self.caption.is_some() {
            return Err(format!(
                "message {} has both text and caption",
                self.id
            ));
        }
        if self.forward.is_forwarded && self.forward.forward_from_type.is_none() {
            return Err(format!(
                "message {} is forwarded but has no forwardFromType",
                self.id
            ));
        }
        Ok(())
    }
}

/// Sender classification, exactly one branch per message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "senderType", rename_all = "lowercase")]
pub enum Sender {
    User {
        #[serde(rename = "senderID")]
        id: i64,
        #[serde(rename = "senderName", default)]
        name: String,
        #[serde(rename = "senderUsername", default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(rename = "senderFirstName", default, skip_serializing_if = "Option::is_none")]
        first_name: Option<String>,
        #[serde(rename = "senderLastName", default, skip_serializing_if = "Option::is_none")]
        last_name: Option<String>,
    },
    Chat {
        #[serde(rename = "senderID")]
        id: i64,
        #[serde(rename = "senderName", default)]
        name: String,
        #[serde(rename = "senderUsername", default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(rename = "senderChatTitle", default, skip_serializing_if = "Option::is_none")]
        chat_title: Option<String>,
    },
}

impl Sender {
    /// A user sender with only an id and display name
    pub fn user(id: i64, name: impl Into<String>) -> Self {
        Sender::User {
            id,
            name: name.into(),
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_username(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Sender::User { username, .. } | Sender::Chat { username, .. } => {
                *username = Some(value.into())
            }
        }
        self
    }

    pub fn id(&self) -> i64 {
        match self {
            Sender::User { id, .. } | Sender::Chat { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Sender::User { name, .. } | Sender::Chat { name, .. } => name,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Sender::User { username, .. } | Sender::Chat { username, .. } => username.as_deref(),
        }
    }

    pub fn kind(&self) -> SenderType {
        match self {
            Sender::User { .. } => SenderType::User,
            Sender::Chat { .. } => SenderType::Chat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SenderType {
    User,
    Chat,
}

/// Where a forwarded message originally came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardInfo {
    #[serde(default)]
    pub is_forwarded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_from_type: Option<ForwardSource>,

    #[serde(default, rename = "forwardFromID", skip_serializing_if = "Option::is_none")]
    pub forward_from_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_from_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForwardSource {
    User,
    Chat,
    NameOnly,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Photo,
    Sticker,
    Video,
    Document,
    #[serde(other)]
    Other,
}

/// Media attributes; which ones are set depends on the content type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    #[serde(default, rename = "fileID", skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,

    /// Seconds, for video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker_emoji: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker_set_name: Option<String>,
}

/// A mention, hashtag or similar span inside the message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub entity_type: String,

    pub offset: i64,

    pub length: i64,

    /// Resolved user, only for `text_mention`
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl MessageEntity {
    pub fn mention(offset: i64, length: i64) -> Self {
        Self {
            entity_type: "mention".to_string(),
            offset,
            length,
            user_id: None,
        }
    }

    pub fn text_mention(offset: i64, length: i64, user_id: i64) -> Self {
        Self {
            entity_type: TEXT_MENTION_ENTITY_TYPE.to_string(),
            offset,
            length,
            user_id: Some(user_id),
        }
    }

    pub fn hashtag(offset: i64, length: i64) -> Self {
        Self {
            entity_type: "hashtag".to_string(),
            offset,
            length,
            user_id: None,
        }
    }

    pub fn is_mention(&self) -> bool {
        MENTION_ENTITY_TYPES.contains(&self.entity_type.as_str())
    }
}
