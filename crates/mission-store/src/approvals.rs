use anyhow::Result;
use mission_common::validate::{clamp_text, limits};
use mission_core::{
    ApprovalItem, ApprovalStatus, ApprovalType, Decision, TransitionError, now_epoch_ms,
    now_rfc3339, time_based_id,
};

use crate::{Approvals, FileStore};

const DEFAULT_REQUESTER: &str = "Console";

#[derive(Debug, Clone, Default)]
pub struct NewApproval {
    pub kind: ApprovalType,
    pub content: String,
    pub requested_by: Option<String>,
    pub tool_id: Option<String>,
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved(ApprovalItem),
    NotFound,
    AlreadyResolved(ApprovalItem),
}

impl FileStore {
    pub fn list_approvals(&self, pending_only: bool) -> Result<Vec<ApprovalItem>> {
        let items = self.list::<Approvals>()?;
        if !pending_only {
            return Ok(items);
        }
        Ok(items.into_iter().filter(ApprovalItem::is_pending).collect())
    }

    pub fn create_approval(&self, input: NewApproval) -> Result<ApprovalItem> {
        let existing = self.list::<Approvals>()?;
        let id = time_based_id("a", now_epoch_ms(), |candidate| {
            existing.iter().any(|item| item.id == candidate)
        });
        let requested_by = input
            .requested_by
            .map(|v| clamp_text(v.trim(), limits::REQUESTED_BY))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REQUESTER.to_string());
        let item = ApprovalItem {
            id,
            kind: input.kind,
            content: clamp_text(&input.content, limits::APPROVAL_CONTENT),
            requested_by,
            status: ApprovalStatus::Pending,
            tool_id: input.tool_id.map(|v| clamp_text(&v, limits::REQUESTED_BY)),
            session_key: input.session_key.map(|v| clamp_text(&v, limits::REQUESTED_BY)),
            created_at: now_rfc3339(),
            resolved_at: None,
            updated_at_ms: None,
        };
        self.write::<Approvals>(item)
    }

    pub fn resolve_approval(&self, id: &str, decision: Decision) -> Result<ResolveOutcome> {
        let Some(mut item) = self.read::<Approvals>(id)? else {
            return Ok(ResolveOutcome::NotFound);
        };
        match item.resolve(decision, now_rfc3339()) {
            Ok(()) => {
                let stored = self.write::<Approvals>(item)?;
                Ok(ResolveOutcome::Resolved(stored))
            }
            Err(TransitionError::AlreadyResolved { .. }) => Ok(ResolveOutcome::AlreadyResolved(item)),
        }
    }
}
