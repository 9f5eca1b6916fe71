use serde::{Deserialize, Serialize};

/// Identity of one customer conversation. Keys all persisted state and the
/// per-conversation locking discipline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Customer,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer" => Some(Self::Customer),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One turn of the append-only conversation log. The log is opaque tone
/// context for the message composer and is never parsed back structurally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ConversationTurn {
    pub fn customer(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Customer, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Assistant, text: text.into() }
    }
}
