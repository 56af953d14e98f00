//! Core data models for the chat ledger

use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Sender =================
//

/// Authenticated author of a message, as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Sender(String);

impl Sender {
    /// Transport prefixes such as `whatsapp:` are not part of the identity.
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let id = trimmed.strip_prefix("whatsapp:").unwrap_or(trimmed);
        Self(id.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Sender {
    fn from(value: String) -> Self {
        Sender::new(&value)
    }
}

impl From<&str> for Sender {
    fn from(value: &str) -> Self {
        Sender::new(value)
    }
}

impl From<Sender> for String {
    fn from(value: Sender) -> Self {
        value.0
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ================= Inbound =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: Sender,
    pub body: String,
    pub media_url: Option<String>,
}

impl InboundMessage {
    pub fn new(sender: impl Into<Sender>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            media_url: None,
        }
    }

    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }
}

//
// ================= Conversation =================
//

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Idle,
    AwaitingSubChoice { command: String },
    AwaitingForm { template_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub mode: Mode,
    /// Persistent two-valued routing flag, only used by mode-toggle routing.
    pub toggle: Option<String>,
}

//
// ================= Records =================
//

/// Field names of a record built from free text, in row order.
pub const FREE_TEXT_FIELDS: &[&str] = &[
    "TIMESTAMP",
    "SENDER",
    "CATEGORY",
    "DESCRIPTION",
    "AMOUNT",
    "CURRENCY",
    "MEDIA_LINK",
];

/// Ordered field → value mapping. Keys are upper-cased and trimmed,
/// values are trimmed and never contain line breaks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecord {
    fields: Vec<(String, String)>,
}

impl ParsedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later values overwrite earlier ones but keep the original position.
    pub fn insert(&mut self, key: &str, value: &str) {
        let key = key.trim().to_uppercase();
        if key.is_empty() {
            return;
        }
        let value = value.replace(['\r', '\n'], " ").trim().to_string();

        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.trim().to_uppercase();
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Present and non-empty
    pub fn has_value(&self, key: &str) -> bool {
        self.get(key).map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// One `FIELD: value` cell per field.
    pub fn labelled_row(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect()
    }

    /// One cell per field value.
    pub fn value_row(&self) -> Vec<String> {
        self.fields.iter().map(|(_, v)| v.clone()).collect()
    }
}

//
// ================= Routing =================
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub destinations: Vec<String>,
    /// Fan-out decisions tolerate individual destinations failing.
    pub partial: bool,
}

impl RoutingDecision {
    pub fn single(destination: impl Into<String>) -> Self {
        Self {
            destinations: vec![destination.into()],
            partial: false,
        }
    }

    pub fn fan_out(destinations: Vec<String>) -> Self {
        Self {
            destinations,
            partial: true,
        }
    }
}
