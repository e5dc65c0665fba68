//! Chat session and turn types for PagePilot.
//!
//! A session belongs to exactly one browser tab and holds the ordered turns
//! exchanged about the page open in that tab.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Identifier of the browsing-context unit a conversation is scoped to.
///
/// Hosts hand out tab ids as small integers, but they are opaque to us.
/// Either a string or an integer is accepted on input; output is always a
/// string. The empty string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TabId(pub String);

impl<'de> Deserialize<'de> for TabId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTabId {
            Text(String),
            Number(i64),
        }

        match RawTabId::deserialize(deserializer) {
            Ok(RawTabId::Text(s)) if s.is_empty() => Err(serde::de::Error::custom("tab id must not be empty")),
            Ok(RawTabId::Text(s)) => Ok(Self(s)),
            Ok(RawTabId::Number(n)) => Ok(Self(n.to_string())),
            Err(_) => Err(serde::de::Error::custom("tab id must be a string or an integer")),
        }
    }
}

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TabId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
            TurnRole::System => write!(f, "system"),
        }
    }
}

impl FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            "system" => Ok(TurnRole::System),
            other => Err(format!("invalid turn role: '{other}'")),
        }
    }
}

/// Delivery status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    #[default]
    Sending,
    Sent,
    Error,
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnStatus::Sending => write!(f, "sending"),
            TurnStatus::Sent => write!(f, "sent"),
            TurnStatus::Error => write!(f, "error"),
        }
    }
}

/// One message in a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: String,
    pub role: TurnRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub status: TurnStatus,
}

/// A turn about to be appended; id and timestamp are assigned when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewChatTurn {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Option<TurnRole>,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TurnStatus,
}

impl NewChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some(TurnRole::User),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Some(TurnRole::Assistant),
            text: text.into(),
            status: TurnStatus::Sent,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// The conversation held for one tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub tab_id: TabId,
    pub turns: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// A fresh session with no turns.
    pub fn empty(tab_id: TabId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            tab_id,
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn find_turn(&self, turn_id: &str) -> Option<&ChatTurn> {
        self.turns.iter().rev().find(|t| t.id == turn_id)
    }
}
