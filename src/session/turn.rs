use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    text: String,
    timestamp: DateTime<Local>,
}

impl Turn {
    /// Create a turn stamped with the current local time
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self::with_timestamp(role, text, Local::now())
    }

    pub fn with_timestamp(role: Role, text: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Same turn, stamped no earlier than `floor`
    pub(crate) fn not_before(self, floor: DateTime<Local>) -> Self {
        if self.timestamp < floor {
            Self {
                timestamp: floor,
                ..self
            }
        } else {
            self
        }
    }
}
