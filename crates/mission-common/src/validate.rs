use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Character caps applied to free text before it is persisted or relayed.
pub mod limits {
    pub const TASK_TITLE: usize = 500;
    pub const TASK_TAG: usize = 50;
    pub const TASK_TAGS: usize = 20;
    pub const ASSIGNEE: usize = 100;
    pub const APPROVAL_CONTENT: usize = 10_000;
    pub const REQUESTED_BY: usize = 100;
    pub const CONSOLE_TEXT: usize = 4_000;
    pub const AGENT_NAME: usize = 100;
    pub const SPAWN_TASK: usize = 2_000;
    pub const SPAWN_LABEL: usize = 100;
    pub const FILE_CONTENT_BYTES: usize = 1024 * 1024;
}

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("identifier pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} has an invalid format")]
    InvalidIdentifier { field: &'static str },
    #[error("{field} must not start with '-'")]
    LooksLikeOption { field: &'static str },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} contains control characters")]
    ControlCharacter { field: &'static str },
}

/// Accepts only `^[A-Za-z0-9_-]+$`. Invalid input is rejected, never stripped.
pub fn identifier<'a>(field: &'static str, raw: &'a str) -> Result<&'a str, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    if raw.len() > MAX_IDENTIFIER_LEN || !IDENTIFIER.is_match(raw) {
        return Err(ValidationError::InvalidIdentifier { field });
    }
    Ok(raw)
}

/// Truncates to at most `max_chars` characters, respecting char boundaries.
pub fn clamp_text(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => raw[..idx].to_string(),
        None => raw.to_string(),
    }
}

/// Free text headed for an argument vector. Over-long text, control
/// characters other than newline and tab, and option lookalikes are rejected.
pub fn argument_text(
    field: &'static str,
    raw: &str,
    max_chars: usize,
) -> Result<String, ValidationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    if text.chars().count() > max_chars {
        return Err(ValidationError::TooLong {
            field,
            max: max_chars,
        });
    }
    if text.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return Err(ValidationError::ControlCharacter { field });
    }
    if text.starts_with('-') {
        return Err(ValidationError::LooksLikeOption { field });
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_follow_allow_pattern() {
        assert_eq!(identifier("jobId", "nightly_backup-2"), Ok("nightly_backup-2"));
        for bad in ["t1; rm -rf /", "a b", "$(id)", "job.1", "ünïcode", "`x`"] {
            assert_eq!(
                identifier("jobId", bad),
                Err(ValidationError::InvalidIdentifier { field: "jobId" }),
                "{bad}"
            );
        }
        assert_eq!(
            identifier("jobId", ""),
            Err(ValidationError::Missing { field: "jobId" })
        );
        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(identifier("jobId", &long).is_err());
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        assert_eq!(clamp_text("héllo", 2), "hé");
        assert_eq!(clamp_text("short", 50), "short");
        assert_eq!(clamp_text("", 3), "");
    }

    #[test]
    fn argument_text_rejects_option_lookalikes() {
        assert_eq!(
            argument_text("task", "--agent-id evil", 100),
            Err(ValidationError::LooksLikeOption { field: "task" })
        );
        assert_eq!(argument_text("task", "  summarize inbox ", 100).as_deref(), Ok("summarize inbox"));
        assert_eq!(argument_text("label", "abc", 3).as_deref(), Ok("abc"));
    }

    #[test]
    fn argument_text_rejects_long_and_control_text() {
        assert_eq!(
            argument_text("label", "abcdef", 3),
            Err(ValidationError::TooLong { field: "label", max: 3 })
        );
        assert_eq!(
            argument_text("task", "ship\u{1b}[2Jit", 100),
            Err(ValidationError::ControlCharacter { field: "task" })
        );
        assert_eq!(
            argument_text("task", "line one\nline two", 100).as_deref(),
            Ok("line one\nline two")
        );
    }
}
