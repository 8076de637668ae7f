use anyhow::Result;
use chrono::Local;
use mission_common::validate::{clamp_text, limits};
use mission_core::{ChatMessage, Sender, now_epoch_ms, time_based_id};

use crate::{ConsoleHistory, FileStore};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct ChatDraft {
    pub sender: Sender,
    pub agent_name: Option<String>,
    pub text: String,
}

impl FileStore {
    pub fn console_history(&self) -> Result<Vec<ChatMessage>> {
        self.list::<ConsoleHistory>()
    }

    /// Appends a message and keeps only the newest `history_limit` entries.
    pub fn append_console(&self, draft: ChatDraft) -> Result<ChatMessage> {
        let mut history = self.list::<ConsoleHistory>()?;
        let id = time_based_id("c", now_epoch_ms(), |candidate| {
            history.iter().any(|msg| msg.id == candidate)
        });
        let message = ChatMessage {
            id,
            sender: draft.sender,
            agent_name: draft
                .agent_name
                .map(|name| clamp_text(name.trim(), limits::AGENT_NAME))
                .filter(|name| !name.is_empty()),
            text: clamp_text(&draft.text, limits::CONSOLE_TEXT),
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        };
        history.push(message.clone());
        let overflow = history.len().saturating_sub(self.history_limit());
        history.drain(..overflow);
        self.replace_all::<ConsoleHistory>(&history)?;
        Ok(message)
    }

    pub fn clear_console(&self) -> Result<()> {
        self.replace_all::<ConsoleHistory>(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(text: &str) -> ChatDraft {
        ChatDraft {
            sender: Sender::User,
            agent_name: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn history_is_bounded_to_newest_messages() {
        let store = FileStore::in_memory().with_history_limit(3);
        for i in 0..5 {
            store.append_console(draft(&format!("msg {i}"))).expect("append");
        }
        let texts: Vec<String> = store
            .console_history()
            .expect("history")
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn clear_empties_history() {
        let store = FileStore::in_memory();
        store.append_console(draft("hello")).expect("append");
        store.clear_console().expect("clear");
        assert!(store.console_history().expect("history").is_empty());
    }
}
