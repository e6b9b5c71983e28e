use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Friendly,
    Professional,
    Tutor,
}

impl Tone {
    pub const ALL: [Tone; 3] = [Tone::Friendly, Tone::Professional, Tone::Tutor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Friendly => "friendly",
            Tone::Professional => "professional",
            Tone::Tutor => "tutor",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        crate::completion::prompts::system_prompt(*self)
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = std::convert::Infallible;

    /// Unrecognised names fall back to `Friendly`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Tone::Professional,
            "tutor" => Tone::Tutor,
            _ => Tone::Friendly,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// What the identity provider knows about a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

/// Per-user profile record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    /// `None` for guests.
    pub email: Option<String>,
    pub is_premium: bool,
    pub daily_usage: u32,
    pub selected_tone: Tone,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(identity: &Identity, tone: Tone) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            is_premium: false,
            daily_usage: 0,
            selected_tone: tone,
            created_at: Utc::now(),
        }
    }

    pub fn is_guest(&self) -> bool {
        self.email.is_none()
    }

    pub fn tier(&self) -> &'static str {
        if self.is_premium {
            "premium"
        } else {
            "free"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub chat_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_voice: bool,
}

/// A message as submitted for persistence; the backend assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub chat_id: String,
    pub sender: Sender,
    pub content: String,
    pub is_voice: bool,
}

impl NewMessage {
    pub fn user(chat_id: &str, content: &str, is_voice: bool) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            sender: Sender::User,
            content: content.to_string(),
            is_voice,
        }
    }

    pub fn ai(chat_id: &str, content: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            sender: Sender::Ai,
            content: content.to_string(),
            is_voice: false,
        }
    }
}
