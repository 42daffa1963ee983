//! Persisted conversation for `ask --conversation`
//!
//! Turns are kept oldest first as one JSON string under a single key of their
//! own store. Every successful exchange appends the user prompt and the
//! assistant reply; `conversation new` clears the list.

use std::fmt::Write as _;

use chat::{ChatMessage, Role};
use key_pool::{Error, KeyValueStore, Result, StoredValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CONVERSATION_KEY: &str = "conversation";

/// Separator between model answers when an all-models reply is stored as one turn.
pub const COMBINED_SEPARATOR: &str = "\n\n---\n\n";

/// One stored turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(flatten)]
    pub message: ChatMessage,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

/// Conversation history, oldest turn first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns as chat messages, ready to go in front of a new prompt.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.turns().iter().map(|t| t.message.clone()).collect()
    }

    /// Record one exchange.
    pub fn push_exchange(&mut self, prompt: &str, reply: &str, now_ms: u64) {
        self.turns.push(Turn {
            message: ChatMessage::user(prompt),
            timestamp: now_ms,
        });
        self.turns.push(Turn {
            message: ChatMessage::assistant(reply),
            timestamp: now_ms,
        });
        debug!(turns = self.turns.len(), "conversation extended");
    }

    /// Markdown rendering with `HH:MM` (UTC) per turn.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "No conversation history".to_string();
        }
        let mut out = format!("## Conversation History ({} messages)\n\n", self.len());
        for turn in &self.turns {
            let who = match turn.message.role {
                Role::User => "You",
                Role::Assistant => "AI",
                Role::System => "System",
            };
            let _ = write!(
                out,
                "**{who}** ({}):\n{}\n\n",
                clock_utc(turn.timestamp),
                turn.message.content
            );
        }
        out.trim_end().to_string()
    }
}

fn clock_utc(ms: u64) -> String {
    let secs_of_day = (ms / 1000) % 86_400;
    format!("{:02}:{:02}", secs_of_day / 3600, (secs_of_day % 3600) / 60)
}

/// Load the stored conversation. Unreadable data is treated as empty.
pub async fn load_conversation(store: &dyn KeyValueStore) -> Result<Conversation> {
    let entries = store.read_all().await?;
    let Some(raw) = entries.get(CONVERSATION_KEY).and_then(StoredValue::as_str) else {
        return Ok(Conversation::default());
    };
    match serde_json::from_str(raw) {
        Ok(turns) => Ok(Conversation { turns }),
        Err(e) => {
            warn!(error = %e, "ignoring unreadable conversation");
            Ok(Conversation::default())
        }
    }
}

pub async fn save_conversation(store: &dyn KeyValueStore, conversation: &Conversation) -> Result<()> {
    let raw = serde_json::to_string(&conversation.turns)
        .map_err(|e| Error::Store(format!("serializing conversation: {e}")))?;
    store
        .write_batch(vec![(CONVERSATION_KEY.to_string(), StoredValue::Str(raw))])
        .await
}
