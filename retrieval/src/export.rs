//! Parsing of exported chat histories.
//!
//! Three shapes are accepted: an array of conversations, a single
//! conversation object, or a flat array of messages.

use std::path::Path;

use chatvault_embeddings::MetadataValue;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// One message of an exported conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedMessage {
    /// Message ID from the export, if it has one.
    #[serde(default)]
    pub id: Option<String>,

    /// Author role (`user`, `assistant`, ...).
    #[serde(default = "default_role")]
    pub role: String,

    /// Message text.
    pub content: String,

    /// Timestamp as exported (ISO string or epoch number).
    #[serde(default)]
    pub timestamp: Option<MetadataValue>,

    /// Optional grouping label.
    #[serde(default)]
    pub group: Option<String>,
}

fn default_role() -> String {
    "user".to_string()
}

/// A titled list of messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub title: Option<String>,

    pub messages: Vec<ExportedMessage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExport {
    Conversations(Vec<Conversation>),
    Single(Conversation),
    Messages(Vec<ExportedMessage>),
}

/// A parsed chat-history export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatExport {
    pub conversations: Vec<Conversation>,
}

impl ChatExport {
    /// Parse an export from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawExport = serde_json::from_str(json)
            .map_err(|e| RetrievalError::Import(format!("unrecognized chat export: {e}")))?;

        let conversations = match raw {
            RawExport::Conversations(conversations) => conversations,
            RawExport::Single(conversation) => vec![conversation],
            RawExport::Messages(messages) => vec![Conversation {
                title: None,
                messages,
            }],
        };

        Ok(Self { conversations })
    }

    /// Read and parse an export file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Total number of messages across all conversations.
    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|c| c.messages.len()).sum()
    }

    /// Every message paired with the title of its conversation.
    pub fn messages(&self) -> impl Iterator<Item = (Option<&str>, &ExportedMessage)> {
        self.conversations.iter().flat_map(|c| {
            c.messages
                .iter()
                .map(move |m| (c.title.as_deref(), m))
        })
    }
}
