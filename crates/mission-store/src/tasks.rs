use anyhow::Result;
use mission_common::validate::{clamp_text, limits};
use mission_core::{Priority, Task, TaskStatus, now_epoch_ms, time_based_id};

use crate::{FileStore, Tasks};

const DEFAULT_TITLE: &str = "New Task";

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    pub tags: Vec<String>,
}

/// Fields a client may change on an existing task. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.title.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
            && self.tags.is_none()
    }
}

fn clean_title(raw: &str) -> String {
    let title = clamp_text(raw.trim(), limits::TASK_TITLE);
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

fn clean_tags(raw: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = clamp_text(tag.trim(), limits::TASK_TAG);
        if tag.is_empty() || tags.contains(&tag) {
            continue;
        }
        tags.push(tag);
        if tags.len() == limits::TASK_TAGS {
            break;
        }
    }
    tags
}

fn clean_assignee(raw: &str) -> Option<String> {
    let name = clamp_text(raw.trim(), limits::ASSIGNEE);
    (!name.is_empty()).then_some(name)
}

impl FileStore {
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.list::<Tasks>()
    }

    pub fn create_task(&self, input: NewTask) -> Result<Task> {
        let existing = self.list::<Tasks>()?;
        let id = time_based_id("t", now_epoch_ms(), |candidate| {
            existing.iter().any(|task| task.id == candidate)
        });
        let task = Task {
            id,
            title: clean_title(&input.title),
            status: input.status.unwrap_or_default(),
            assigned_to: input.assigned_to.as_deref().and_then(clean_assignee),
            priority: input.priority.unwrap_or_default(),
            tags: clean_tags(&input.tags),
            updated_at_ms: None,
        };
        self.write::<Tasks>(task)
    }

    /// `Ok(None)` when no task has that id.
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>> {
        let Some(mut task) = self.read::<Tasks>(id)? else {
            return Ok(None);
        };
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(title) = patch.title {
            task.title = clean_title(&title);
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(assignee) = patch.assigned_to {
            task.assigned_to = clean_assignee(&assignee);
        }
        if let Some(tags) = patch.tags {
            task.tags = clean_tags(&tags);
        }
        self.write::<Tasks>(task).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_title_gets_default_and_long_title_is_capped() {
        let store = FileStore::in_memory();
        let blank = store.create_task(NewTask::default()).expect("create");
        assert_eq!(blank.title, DEFAULT_TITLE);
        assert_eq!(blank.status, TaskStatus::Backlog);

        let long = store
            .create_task(NewTask {
                title: "x".repeat(2_000),
                ..NewTask::default()
            })
            .expect("create");
        assert_eq!(long.title.chars().count(), limits::TASK_TITLE);
    }

    #[test]
    fn tags_are_trimmed_deduplicated_and_bounded() {
        let tags: Vec<String> = (0..40).map(|i| format!(" tag{} ", i % 30)).collect();
        let cleaned = clean_tags(&tags);
        assert_eq!(cleaned.len(), limits::TASK_TAGS);
        assert_eq!(cleaned[0], "tag0");
    }

    #[test]
    fn burst_creates_get_distinct_ids() {
        let store = FileStore::in_memory();
        let ids: Vec<String> = (0..5)
            .map(|i| {
                store
                    .create_task(NewTask {
                        title: format!("task {i}"),
                        ..NewTask::default()
                    })
                    .expect("create")
                    .id
            })
            .collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.iter().all(|id| id.starts_with('t')));
    }
}
