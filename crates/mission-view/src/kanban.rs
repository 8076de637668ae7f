use std::future::Future;

use mission_core::{Task, TaskStatus};
use thiserror::Error;
use tracing::warn;

use crate::client::{ApiClient, ClientError};

/// Where a board move is persisted.
pub trait TaskSink: Send + Sync {
    fn persist_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> impl Future<Output = Result<Task, ClientError>> + Send;
}

impl TaskSink for ApiClient {
    fn persist_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> impl Future<Output = Result<Task, ClientError>> + Send {
        self.move_task(id, status)
    }
}

#[derive(Debug, Error)]
pub enum KanbanError {
    #[error("unknown task {0}")]
    UnknownTask(String),
    #[error("move of {id} was reverted: {source}")]
    Reverted { id: String, source: ClientError },
}

/// Local board state. Moves apply immediately and are rolled back when the
/// server refuses them.
pub struct KanbanBoard<S> {
    sink: S,
    tasks: Vec<Task>,
    last_error: Option<String>,
}

impl<S: TaskSink> KanbanBoard<S> {
    pub fn new(sink: S, tasks: Vec<Task>) -> Self {
        Self {
            sink,
            tasks,
            last_error: None,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn column(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Replaces local state with a fresh server listing.
    pub fn reload(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    pub async fn move_task(&mut self, id: &str, to: TaskStatus) -> Result<(), KanbanError> {
        let idx = self
            .position(id)
            .ok_or_else(|| KanbanError::UnknownTask(id.to_string()))?;
        let from = self.tasks[idx].status;
        if from == to {
            return Ok(());
        }
        self.tasks[idx].status = to;

        match self.sink.persist_status(id, to).await {
            Ok(saved) => {
                if let Some(idx) = self.position(&saved.id) {
                    self.tasks[idx] = saved;
                }
                self.last_error = None;
                Ok(())
            }
            Err(source) => {
                warn!(
                    task = id,
                    from = from.as_str(),
                    to = to.as_str(),
                    error = %source,
                    "task move reverted"
                );
                if let Some(idx) = self.position(id) {
                    self.tasks[idx].status = from;
                }
                self.last_error = Some(source.to_string());
                Err(KanbanError::Reverted {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }
}
