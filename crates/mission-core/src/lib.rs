pub mod approval;
pub mod console;
pub mod document;
pub mod external;
pub mod settings;
pub mod task;

use chrono::{DateTime, SecondsFormat, Utc};

pub use approval::{ApprovalItem, ApprovalStatus, ApprovalType, Decision, TransitionError};
pub use console::{ChatMessage, Sender};
pub use document::MemoryFile;
pub use external::{CronJob, CronJobState, CronSchedule, Session};
pub use settings::{ModelConfig, RiskLevel, SettingsDocument, ToolConfig};
pub use task::{Priority, Task, TaskStatus};

/// A record living inside one flat JSON document, addressed by `key`.
pub trait Record: Clone {
    fn key(&self) -> &str;

    /// Store-managed modification stamp in epoch milliseconds.
    fn modified_at_ms(&self) -> Option<i64>;

    fn set_modified_at_ms(&mut self, at_ms: i64);

    /// Stamps the record with `now_ms`, or one past the previous stamp if the
    /// clock has not moved, so that every write advances the stamp.
    fn touch(&mut self, now_ms: i64) {
        let next = match self.modified_at_ms() {
            Some(prev) if prev >= now_ms => prev + 1,
            _ => now_ms,
        };
        self.set_modified_at_ms(next);
    }
}

pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn rfc3339_from_ms(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Time-based identifier (`<prefix><epoch-ms>`). Bumps the millisecond until
/// the candidate is unused, so ids stay unique under bursty creates.
pub fn time_based_id(prefix: &str, now_ms: i64, is_taken: impl Fn(&str) -> bool) -> String {
    let mut stamp = now_ms;
    loop {
        let candidate = format!("{prefix}{stamp}");
        if !is_taken(&candidate) {
            return candidate;
        }
        stamp += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_based_id_skips_taken_values() {
        let taken = ["t1000".to_string(), "t1001".to_string()];
        let id = time_based_id("t", 1000, |c| taken.iter().any(|t| t == c));
        assert_eq!(id, "t1002");
    }

    #[test]
    fn touch_always_advances() {
        let mut task = Task::new("t1", "Write report");
        task.touch(500);
        assert_eq!(task.modified_at_ms(), Some(500));
        task.touch(500);
        assert_eq!(task.modified_at_ms(), Some(501));
        task.touch(400);
        assert_eq!(task.modified_at_ms(), Some(502));
        task.touch(9_000);
        assert_eq!(task.modified_at_ms(), Some(9_000));
    }

    #[test]
    fn rfc3339_from_ms_formats_utc() {
        assert_eq!(
            rfc3339_from_ms(0).as_deref(),
            Some("1970-01-01T00:00:00.000Z")
        );
    }
}
