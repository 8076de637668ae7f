use std::collections::BTreeMap;
use std::time::Duration;

use mission_common::PollConfig;
use mission_core::{ApprovalItem, CronJob, Session, Task, TaskStatus, now_epoch_ms};
use serde::Serialize;
use serde_json::Value;

use crate::client::{ApiClient, ClientError};
use crate::state::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    Dashboard,
    Console,
    Kanban,
    Memory,
    Fleet,
    Approvals,
    Settings,
}

impl Tab {
    pub const ALL: [Tab; 7] = [
        Self::Dashboard,
        Self::Console,
        Self::Kanban,
        Self::Memory,
        Self::Fleet,
        Self::Approvals,
        Self::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Console => "console",
            Self::Kanban => "kanban",
            Self::Memory => "memory",
            Self::Fleet => "fleet",
            Self::Approvals => "approvals",
            Self::Settings => "settings",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|tab| tab.as_str() == value)
    }

    pub fn poll_interval(&self, poll: &PollConfig) -> Duration {
        let secs = match self {
            Self::Dashboard => poll.dashboard_secs,
            Self::Fleet => poll.fleet_secs,
            Self::Approvals => poll.approvals_secs,
            _ => poll.default_secs,
        };
        Duration::from_secs(secs.max(1))
    }

    /// One fetch of everything the tab renders.
    pub async fn fetch(&self, client: &ApiClient) -> ViewState<Value> {
        ViewState::from_json(self.load(client).await)
    }

    async fn load(&self, client: &ApiClient) -> Result<Value, ClientError> {
        let value = match self {
            Self::Dashboard => {
                let summary = DashboardSummary::compute(
                    &client.tasks().await?,
                    &client.approvals(true).await?,
                    &client.sessions().await?,
                    &client.cron_jobs().await?,
                    now_epoch_ms(),
                );
                serde_json::to_value(summary)?
            }
            Self::Console => serde_json::to_value(client.console().await?)?,
            Self::Kanban => serde_json::to_value(client.tasks().await?)?,
            Self::Memory => serde_json::to_value(client.files().await?)?,
            Self::Fleet => serde_json::json!({
                "sessions": client.sessions().await?,
                "cron": client.cron_jobs().await?,
            }),
            Self::Approvals => serde_json::to_value(client.approvals(true).await?)?,
            Self::Settings => client.settings().await?,
        };
        Ok(value)
    }
}

/// Header figures shown on the dashboard tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub tasks_by_status: BTreeMap<String, usize>,
    pub open_tasks: usize,
    pub pending_approvals: usize,
    pub sessions: usize,
    pub total_tokens: u64,
    pub running_jobs: usize,
    pub next_job: Option<String>,
    pub next_run_at_ms: Option<i64>,
}

impl DashboardSummary {
    pub fn compute(
        tasks: &[Task],
        approvals: &[ApprovalItem],
        sessions: &[Session],
        jobs: &[CronJob],
        now_ms: i64,
    ) -> Self {
        let tasks_by_status = TaskStatus::ALL
            .iter()
            .map(|status| {
                let count = tasks.iter().filter(|t| t.status == *status).count();
                (status.as_str().to_string(), count)
            })
            .collect();
        let next = jobs
            .iter()
            .filter_map(|job| job.next_run_ms(now_ms).map(|at| (at, job)))
            .min_by_key(|(at, _)| *at);
        Self {
            tasks_by_status,
            open_tasks: tasks.iter().filter(|t| t.status != TaskStatus::Done).count(),
            pending_approvals: approvals.iter().filter(|a| a.is_pending()).count(),
            sessions: sessions.len(),
            total_tokens: sessions.iter().map(|s| s.tokens_used).sum(),
            running_jobs: jobs.iter().filter(|j| j.is_running()).count(),
            next_job: next.map(|(_, job)| job.name.clone()),
            next_run_at_ms: next.map(|(at, _)| at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tabs_parse_and_pick_intervals() {
        let poll = PollConfig::default();
        assert_eq!(Tab::parse("Fleet"), Some(Tab::Fleet));
        assert_eq!(Tab::parse("nope"), None);
        assert_eq!(Tab::Dashboard.poll_interval(&poll), Duration::from_secs(10));
        assert_eq!(Tab::Fleet.poll_interval(&poll), Duration::from_secs(15));
        assert_eq!(Tab::Memory.poll_interval(&poll), Duration::from_secs(30));
    }

    #[test]
    fn summary_aggregates_everything() {
        let mut done = Task::new("t2", "Done");
        done.status = TaskStatus::Done;
        let tasks = vec![Task::new("t1", "Open"), done];
        let sessions: Vec<Session> = serde_json::from_value(json!([
            {"key": "a", "tokensUsed": 100},
            {"key": "b", "tokensUsed": 250}
        ]))
        .expect("sessions");
        let jobs: Vec<CronJob> = serde_json::from_value(json!([
            {"id": "late", "name": "Late", "enabled": true, "schedule": {"kind": "every", "everyMs": 600000}},
            {"id": "soon", "name": "Soon", "enabled": true, "schedule": {"kind": "every", "everyMs": 60000},
             "state": {"runningAtMs": 1}},
            {"id": "off", "name": "Off", "enabled": false, "schedule": {"kind": "every", "everyMs": 1000}}
        ]))
        .expect("jobs");

        let summary = DashboardSummary::compute(&tasks, &[], &sessions, &jobs, 1_000_000);
        assert_eq!(summary.tasks_by_status["backlog"], 1);
        assert_eq!(summary.tasks_by_status["done"], 1);
        assert_eq!(summary.tasks_by_status["review"], 0);
        assert_eq!(summary.open_tasks, 1);
        assert_eq!(summary.total_tokens, 350);
        assert_eq!(summary.running_jobs, 1);
        assert_eq!(summary.next_job.as_deref(), Some("Soon"));
        assert_eq!(summary.next_run_at_ms, Some(1_060_000));
    }
}
