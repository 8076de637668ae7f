use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalType {
    #[default]
    Shell,
    GitPush,
    FileWrite,
    MessageSend,
    CronCreate,
    Webhook,
    Tweet,
    Email,
    Deploy,
}

impl ApprovalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::GitPush => "git-push",
            Self::FileWrite => "file-write",
            Self::MessageSend => "message-send",
            Self::CronCreate => "cron-create",
            Self::Webhook => "webhook",
            Self::Tweet => "tweet",
            Self::Email => "email",
            Self::Deploy => "deploy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "shell" => Some(Self::Shell),
            "git-push" => Some(Self::GitPush),
            "file-write" => Some(Self::FileWrite),
            "message-send" => Some(Self::MessageSend),
            "cron-create" => Some(Self::CronCreate),
            "webhook" => Some(Self::Webhook),
            "tweet" => Some(Self::Tweet),
            "email" => Some(Self::Email),
            "deploy" => Some(Self::Deploy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// The only two moves an approval can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn parse(value: &str) -> Option<Self> {
        match ApprovalStatus::parse(value)? {
            ApprovalStatus::Approved => Some(Self::Approve),
            ApprovalStatus::Rejected => Some(Self::Reject),
            ApprovalStatus::Pending => None,
        }
    }

    pub fn target(&self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("approval {id} is already {status}")]
    AlreadyResolved { id: String, status: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalItem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: ApprovalType,
    pub content: String,
    pub requested_by: String,
    #[serde(default)]
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at_ms: Option<i64>,
}

impl ApprovalItem {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Moves a pending item to its final state and stamps `resolved_at`.
    /// Resolved items never move again.
    pub fn resolve(&mut self, decision: Decision, at: String) -> Result<(), TransitionError> {
        if !self.is_pending() {
            return Err(TransitionError::AlreadyResolved {
                id: self.id.clone(),
                status: self.status.as_str(),
            });
        }
        self.status = decision.target();
        self.resolved_at = Some(at);
        Ok(())
    }
}

impl Record for ApprovalItem {
    fn key(&self) -> &str {
        &self.id
    }

    fn modified_at_ms(&self) -> Option<i64> {
        self.updated_at_ms
    }

    fn set_modified_at_ms(&mut self, at_ms: i64) {
        self.updated_at_ms = Some(at_ms);
    }
}
