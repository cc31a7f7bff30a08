//! Conversation and message types for raw conversation logs.
//!
//! A conversation is an ordered list of messages exchanged between one human
//! participant and the operator. Field names follow the raw log format so a
//! document can be re-written without losing unknown fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::ConvoError;

/// Sender id reserved for the operator in raw logs.
pub const DEFAULT_OPERATOR_ID: i64 = 1;

/// Conversation identifier as found in the raw log.
///
/// Logs carry numeric or string ids. Numbers keep their JSON form (unsigned
/// beyond `i64`, or floats such as `12.0`) so that re-written documents match
/// their source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationId {
    Number(Number),
    Text(String),
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationId::Number(n) => write!(f, "{}", n),
            ConversationId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        ConversationId::Number(id.into())
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        ConversationId::Text(id.to_string())
    }
}

/// Role of the message author
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderRole {
    /// The reserved non-human participant
    Operator,
    /// The human participant owning the conversation
    Human,
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderRole::Operator => write!(f, "operator"),
            SenderRole::Human => write!(f, "human"),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sender id; compared against the operator id to derive the role
    #[serde(rename = "ref_user_id")]
    pub sender_id: i64,

    /// Display name of the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_name: Option<String>,

    /// Free text of the message
    #[serde(rename = "message", default)]
    pub text: String,

    /// Source timestamp, opaque and kept verbatim (ISO text or epoch number)
    #[serde(rename = "transaction_datetime_utc")]
    pub timestamp: Value,

    /// Fields not interpreted by the pipeline
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Create a new message with no extra fields.
    pub fn new(
        sender_id: i64,
        screen_name: Option<String>,
        text: impl Into<String>,
        timestamp: impl Into<Value>,
    ) -> Self {
        Self {
            sender_id,
            screen_name,
            text: text.into(),
            timestamp: timestamp.into(),
            extra: Map::new(),
        }
    }

    /// Role of the sender given the reserved operator id.
    pub fn role(&self, operator_id: i64) -> SenderRole {
        if self.sender_id == operator_id {
            SenderRole::Operator
        } else {
            SenderRole::Human
        }
    }

    /// Text with surrounding whitespace removed.
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// A conversation as ingested from the raw log.
///
/// Immutable after ingestion; the segmenter consumes it once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier
    #[serde(rename = "ref_conversation_id")]
    pub conversation_id: ConversationId,

    /// Messages in source order
    #[serde(rename = "messages_list", default)]
    pub messages: Vec<Message>,

    /// Fields not interpreted by the pipeline
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Conversation {
    /// Create a new conversation with no extra fields.
    pub fn new(conversation_id: ConversationId, messages: Vec<Message>) -> Self {
        Self {
            conversation_id,
            messages,
            extra: Map::new(),
        }
    }

    /// The first message not sent by the operator.
    pub fn owner(&self, operator_id: i64) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.role(operator_id) == SenderRole::Human)
    }

    /// Messages sent by the human participant, in order.
    pub fn human_messages(&self, operator_id: i64) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(move |m| m.role(operator_id) == SenderRole::Human)
    }

    /// Segment key of this conversation: owning human plus conversation id.
    pub fn segment_key(&self, operator_id: i64) -> Result<SegmentKey, ConvoError> {
        let owner = self.owner(operator_id).ok_or_else(|| {
            ConvoError::Schema(format!(
                "conversation {} has no non-operator message",
                self.conversation_id
            ))
        })?;

        let screen_name = owner
            .screen_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ConvoError::Schema(format!(
                    "conversation {}: human participant {} has no screen_name",
                    self.conversation_id, owner.sender_id
                ))
            })?;

        Ok(SegmentKey::new(screen_name, self.conversation_id.clone()))
    }

    /// Decode a conversation from a JSON document.
    pub fn from_value(value: Value) -> Result<Self, ConvoError> {
        serde_json::from_value(value).map_err(|e| ConvoError::Schema(e.to_string()))
    }

    /// Encode to a JSON document.
    pub fn to_value(&self) -> Result<Value, ConvoError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Logical identity of one human's conversation.
///
/// Not unique across an input set; the segmenter disambiguates recurrences.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub screen_name: String,
    pub conversation_id: ConversationId,
}

impl SegmentKey {
    pub fn new(screen_name: impl Into<String>, conversation_id: ConversationId) -> Self {
        Self {
            screen_name: screen_name.into(),
            conversation_id,
        }
    }

    /// Base filename key: `{screen_name}_{conversation_id}`.
    pub fn base(&self) -> String {
        format!("{}_{}", self.screen_name, self.conversation_id)
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base())
    }
}
