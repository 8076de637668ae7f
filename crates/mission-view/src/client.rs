use std::time::Duration;

use mission_core::{
    ApprovalItem, ChatMessage, CronJob, Decision, MemoryFile, Session, SettingsDocument, Task,
    TaskStatus,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(35);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },
}

/// Typed access to the mission control HTTP surface.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let message = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        Self::decode(self.http.get(url).send().await?).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ClientError> {
        let resp = self.http.post(self.url(path)?).json(body).send().await?;
        Self::decode(resp).await
    }

    pub async fn health(&self) -> Result<Value, ClientError> {
        self.get(self.url("api/health")?).await
    }

    pub async fn tasks(&self) -> Result<Vec<Task>, ClientError> {
        self.get(self.url("api/tasks")?).await
    }

    pub async fn create_task(&self, title: &str) -> Result<Task, ClientError> {
        self.post("api/tasks", &json!({"action": "create", "title": title}))
            .await
    }

    pub async fn move_task(&self, id: &str, status: TaskStatus) -> Result<Task, ClientError> {
        let body: Value = self
            .post(
                "api/tasks",
                &json!({"action": "update", "id": id, "status": status.as_str()}),
            )
            .await?;
        Ok(serde_json::from_value(body["task"].clone())?)
    }

    pub async fn approvals(&self, pending_only: bool) -> Result<Vec<ApprovalItem>, ClientError> {
        let mut url = self.url("api/approvals")?;
        if pending_only {
            url.query_pairs_mut().append_pair("status", "pending");
        }
        self.get(url).await
    }

    pub async fn resolve_approval(
        &self,
        id: &str,
        decision: Decision,
    ) -> Result<ApprovalItem, ClientError> {
        let body: Value = self
            .post(
                "api/approvals",
                &json!({"action": "update", "id": id, "status": decision.target().as_str()}),
            )
            .await?;
        Ok(serde_json::from_value(body["approval"].clone())?)
    }

    pub async fn cron_jobs(&self) -> Result<Vec<CronJob>, ClientError> {
        self.get(self.url("api/cron")?).await
    }

    pub async fn run_cron_job(&self, job_id: &str) -> Result<(), ClientError> {
        let _: Value = self
            .post("api/cron", &json!({"action": "run", "jobId": job_id}))
            .await?;
        Ok(())
    }

    pub async fn sessions(&self) -> Result<Vec<Session>, ClientError> {
        self.get(self.url("api/sessions")?).await
    }

    pub async fn spawn(&self, task: &str, label: &str) -> Result<Value, ClientError> {
        self.post("api/spawn", &json!({"task": task, "label": label}))
            .await
    }

    pub async fn status(&self) -> Result<Value, ClientError> {
        self.get(self.url("api/status")?).await
    }

    pub async fn files(&self) -> Result<Vec<MemoryFile>, ClientError> {
        self.get(self.url("api/files")?).await
    }

    pub async fn file_content(&self, path: &str) -> Result<String, ClientError> {
        let mut url = self.url("api/files/content")?;
        url.query_pairs_mut().append_pair("path", path);
        let body: Value = self.get(url).await?;
        Ok(body["content"].as_str().unwrap_or_default().to_string())
    }

    pub async fn save_file(&self, path: &str, content: &str) -> Result<(), ClientError> {
        let _: Value = self
            .post("api/files/content", &json!({"path": path, "content": content}))
            .await?;
        Ok(())
    }

    pub async fn console(&self) -> Result<Vec<ChatMessage>, ClientError> {
        self.get(self.url("api/console")?).await
    }

    pub async fn send_console(&self, text: &str) -> Result<ChatMessage, ClientError> {
        self.post(
            "api/console",
            &json!({"action": "append", "sender": "user", "text": text}),
        )
        .await
    }

    pub async fn clear_console(&self) -> Result<(), ClientError> {
        let _: Value = self.post("api/console", &json!({"action": "clear"})).await?;
        Ok(())
    }

    /// The merged settings view (external config plus the settings document).
    pub async fn settings(&self) -> Result<Value, ClientError> {
        self.get(self.url("api/settings")?).await
    }

    pub async fn save_settings(&self, doc: &SettingsDocument) -> Result<(), ClientError> {
        let _: Value = self
            .post("api/settings", &serde_json::to_value(doc)?)
            .await?;
        Ok(())
    }
}
