//! Demo content written on first access when `seed_demo_data` is enabled.

use mission_core::{
    ApprovalItem, ApprovalStatus, ApprovalType, ChatMessage, Priority, Sender, Task, TaskStatus,
    now_rfc3339,
};

fn task(
    id: &str,
    title: &str,
    status: TaskStatus,
    assigned_to: &str,
    priority: Priority,
    tags: &[&str],
) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        status,
        assigned_to: Some(assigned_to.to_string()),
        priority,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        updated_at_ms: None,
    }
}

pub fn demo_tasks() -> Vec<Task> {
    vec![
        task("t1", "Refactor Auth Module", TaskStatus::InProgress, "CodeEx", Priority::High, &["security", "backend"]),
        task("t2", "Write Newsletter Draft", TaskStatus::Review, "Claude Opus", Priority::Medium, &["content"]),
        task("t3", "Optimize Database Indexing", TaskStatus::Backlog, "Gemini Flash", Priority::Low, &["db"]),
        task("t4", "Update Landing Page Assets", TaskStatus::Done, "CodeEx", Priority::Medium, &["frontend"]),
        task("t5", "Research Competitor Pricing", TaskStatus::Backlog, "Perplexity", Priority::Low, &["research"]),
    ]
}

pub fn demo_approvals() -> Vec<ApprovalItem> {
    let created_at = now_rfc3339();
    let item = |id: &str, kind: ApprovalType, requested_by: &str, content: &str| ApprovalItem {
        id: id.to_string(),
        kind,
        content: content.to_string(),
        requested_by: requested_by.to_string(),
        status: ApprovalStatus::Pending,
        tool_id: None,
        session_key: None,
        created_at: created_at.clone(),
        resolved_at: None,
        updated_at_ms: None,
    };
    vec![
        item("1", ApprovalType::Tweet, "Rex", "Just deployed v1.0! #AI #Agents #BuildInPublic"),
        item(
            "2",
            ApprovalType::Email,
            "Muddy",
            "Subject: Q1 Update\n\nHi Team,\n\nWe hit 80% of our goals this week.",
        ),
        item(
            "3",
            ApprovalType::Deploy,
            "CodeEx",
            "git push origin main\n> feat: update dashboard layout",
        ),
    ]
}

pub fn demo_console() -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            id: "c1".to_string(),
            sender: Sender::User,
            agent_name: None,
            text: "Status report on the landing page update?".to_string(),
            timestamp: "10:30:00".to_string(),
        },
        ChatMessage {
            id: "c2".to_string(),
            sender: Sender::Agent,
            agent_name: Some("Muddy".to_string()),
            text: "The update is 90% complete. Waiting for your approval on the new copy."
                .to_string(),
            timestamp: "10:30:05".to_string(),
        },
    ]
}
