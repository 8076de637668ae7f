//! Records owned by the external agent tool. They are parsed leniently and
//! unknown fields are carried through untouched.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronSchedule {
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
}

impl CronSchedule {
    fn at_epoch_ms(&self) -> Option<i64> {
        if let Some(ms) = self.at_ms {
            return Some(ms);
        }
        match self.at.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis()),
            _ => None,
        }
    }

    /// Next fire time strictly after `now_ms`. Cron expressions are evaluated
    /// in UTC; five-field expressions get a leading seconds field.
    pub fn next_after(&self, now_ms: i64, last_run_ms: Option<i64>) -> Option<i64> {
        match self.kind.as_str() {
            "at" => self.at_epoch_ms().filter(|at| *at > now_ms),
            "every" => {
                let every = self.every_ms.filter(|v| *v > 0)?;
                let anchor = last_run_ms.unwrap_or(now_ms);
                if anchor + every > now_ms {
                    Some(anchor + every)
                } else {
                    Some(now_ms + every - (now_ms - anchor) % every)
                }
            }
            "cron" => {
                let expr = self.expr.as_deref()?.trim();
                let normalized = if expr.split_whitespace().count() == 5 {
                    format!("0 {expr}")
                } else {
                    expr.to_string()
                };
                let schedule = cron::Schedule::from_str(&normalized).ok()?;
                let now = DateTime::<Utc>::from_timestamp_millis(now_ms)?;
                schedule
                    .after(&now)
                    .next()
                    .map(|dt| dt.timestamp_millis())
            }
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self.kind.as_str() {
            "cron" => format!(
                "cron {}{}",
                self.expr.as_deref().unwrap_or("?"),
                self.tz
                    .as_deref()
                    .map(|tz| format!(" ({tz})"))
                    .unwrap_or_default()
            ),
            "every" => match self.every_ms {
                Some(ms) if ms % 3_600_000 == 0 => format!("every {}h", ms / 3_600_000),
                Some(ms) if ms % 60_000 == 0 => format!("every {}m", ms / 60_000),
                Some(ms) => format!("every {}s", ms / 1000),
                None => "every ?".to_string(),
            },
            "at" => format!(
                "at {}",
                self.at_epoch_ms()
                    .and_then(crate::rfc3339_from_ms)
                    .unwrap_or_else(|| "?".to_string())
            ),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
    #[serde(default)]
    pub consecutive_errors: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub schedule: CronSchedule,
    #[serde(default)]
    pub state: CronJobState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CronJob {
    pub fn is_running(&self) -> bool {
        self.state.running_at_ms.is_some()
    }

    /// Prefers the external tool's own `nextRunAtMs`, computing one otherwise.
    pub fn next_run_ms(&self, now_ms: i64) -> Option<i64> {
        if !self.enabled {
            return None;
        }
        self.state
            .next_run_at_ms
            .filter(|next| *next > now_ms)
            .or_else(|| self.schedule.next_after(now_ms, self.state.last_run_at_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub key: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub updated_at: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
