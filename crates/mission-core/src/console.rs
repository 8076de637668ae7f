use serde::{Deserialize, Serialize};

use crate::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

impl Sender {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "user" => Some(Self::User),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub text: String,
    pub timestamp: String,
}

// Console history is append-only; the timestamp is the authored time, not a
// modification stamp.
impl Record for ChatMessage {
    fn key(&self) -> &str {
        &self.id
    }

    fn modified_at_ms(&self) -> Option<i64> {
        None
    }

    fn set_modified_at_ms(&mut self, _at_ms: i64) {}
}
