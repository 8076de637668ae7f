use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use mission_common::path_guard::PathError;
use mission_common::validate::identifier;
use mission_core::{
    ApprovalItem, ApprovalStatus, ApprovalType, ChatMessage, CronJob, Decision, MemoryFile,
    Priority, Sender, Session, SettingsDocument, Task, TaskStatus, now_epoch_ms,
};
use mission_relay::RelayError;
use mission_store::{
    ChatDraft, DocumentError, MergedSettings, NewApproval, NewTask, ResolveOutcome, TaskPatch,
    merge_settings, read_external_config,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::{AppState, blocking};

const DEFAULT_SPAWN_TASK: &str = "Hello from Mission Control";
const DEFAULT_SPAWN_LABEL: &str = "MC Agent";

type ApiResult<T> = Result<Json<T>, ApiError>;

/// An empty body reads as `{}`.
fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("Invalid JSON body"))
}

fn fields<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|_| ApiError::bad_request("Invalid request body"))
}

/// Query-string failures get the same `{error}` body as everything else.
fn query<T>(extracted: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    extracted.map(|Query(value)| value).map_err(|rejection| {
        warn!(error = %rejection.body_text(), "rejected query string");
        ApiError::bad_request("Invalid query")
    })
}

fn action(body: &Value) -> Option<&str> {
    body.get("action").and_then(Value::as_str)
}

fn required_id(raw: Option<String>) -> Result<String, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::bad_request("Missing id"))?;
    identifier("id", &raw)
        .map(str::to_string)
        .map_err(|_| ApiError::bad_request("Invalid id"))
}

fn parse_with<T>(
    raw: Option<String>,
    parse: fn(&str) -> Option<T>,
    message: &str,
) -> Result<Option<T>, ApiError> {
    raw.map(|value| parse(&value).ok_or_else(|| ApiError::bad_request(message)))
        .transpose()
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Vec<Task>> {
    let store = state.store.clone();
    blocking(move || {
        store
            .list_tasks()
            .map_err(|err| ApiError::internal("Failed to read tasks", err))
    })
    .await
    .map(Json)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskFields {
    id: Option<String>,
    title: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    assigned_to: Option<String>,
    tags: Option<Vec<String>>,
}

pub async fn post_tasks(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let body = parse_body(&body)?;
    let kind = action(&body).map(str::to_string);
    let input: TaskFields = fields(body)?;
    let status = parse_with(input.status, TaskStatus::parse, "Invalid status")?;
    let priority = parse_with(input.priority, Priority::parse, "Invalid priority")?;
    let store = state.store.clone();

    match kind.as_deref() {
        Some("create") => {
            let draft = NewTask {
                title: input.title.unwrap_or_default(),
                status,
                priority,
                assigned_to: input.assigned_to,
                tags: input.tags.unwrap_or_default(),
            };
            let task = blocking(move || {
                store
                    .create_task(draft)
                    .map_err(|err| ApiError::internal("Failed to update tasks", err))
            })
            .await?;
            info!(task = %task.id, "task created");
            Ok(Json(json!(task)))
        }
        Some("update") => {
            let id = required_id(input.id)?;
            let patch = TaskPatch {
                status,
                title: input.title,
                priority,
                assigned_to: input.assigned_to,
                tags: input.tags,
            };
            if patch.is_empty() {
                return Err(ApiError::bad_request("Nothing to update"));
            }
            let updated = blocking(move || {
                store
                    .update_task(&id, patch)
                    .map_err(|err| ApiError::internal("Failed to update tasks", err))
            })
            .await?;
            let task = updated.ok_or_else(|| ApiError::not_found("Task not found"))?;
            Ok(Json(json!({ "success": true, "task": task })))
        }
        _ => Err(ApiError::bad_request("Invalid action")),
    }
}

pub async fn list_cron(State(state): State<AppState>) -> ApiResult<Vec<CronJob>> {
    let relay = state.relay.clone();
    let mut jobs = blocking(move || Ok(relay.cron_jobs())).await?;
    let now = now_epoch_ms();
    for job in &mut jobs {
        if job.state.next_run_at_ms.is_none() {
            job.state.next_run_at_ms = job.next_run_ms(now);
        }
    }
    Ok(Json(jobs))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CronFields {
    job_id: Option<String>,
}

pub async fn post_cron(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let body = parse_body(&body)?;
    if action(&body) != Some("run") {
        return Err(ApiError::bad_request("Invalid action"));
    }
    let input: CronFields = fields(body)?;
    let job_id = input
        .job_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing jobId"))?;
    let relay = state.relay.clone();
    let id = job_id.clone();
    blocking(move || {
        relay.run_cron_job(&id).map_err(|err| match err {
            RelayError::InvalidArgument(_) => ApiError::bad_request("Invalid jobId format"),
            other => ApiError::internal("Failed to run job", other),
        })
    })
    .await?;
    info!(job = %job_id, "cron job triggered");
    Ok(Json(json!({ "success": true })))
}

pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Vec<Session>> {
    let relay = state.relay.clone();
    blocking(move || Ok(relay.sessions())).await.map(Json)
}

pub async fn status(State(state): State<AppState>) -> ApiResult<Value> {
    let relay = state.relay.clone();
    blocking(move || Ok(relay.status())).await.map(Json)
}

#[derive(Debug, Default, Deserialize)]
struct SpawnFields {
    task: Option<String>,
    label: Option<String>,
}

pub async fn spawn(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let input: SpawnFields = fields(parse_body(&body)?)?;
    let task = input
        .task
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SPAWN_TASK.to_string());
    let label = input
        .label
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SPAWN_LABEL.to_string());
    let relay = state.relay.clone();
    let spawned = blocking(move || {
        relay.spawn_session(&task, &label).map_err(|err| match err {
            RelayError::InvalidArgument(inner) => ApiError::bad_request(inner.to_string()),
            timeout @ RelayError::Timeout { .. } => {
                ApiError::internal("Agent spawn timed out", timeout)
            }
            other => ApiError::internal("Failed to spawn agent", other),
        })
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "sessionKey": spawned.session_key,
        "agentId": spawned.agent_id,
    })))
}

pub async fn list_files(State(state): State<AppState>) -> ApiResult<Vec<MemoryFile>> {
    let documents = state.documents.clone();
    blocking(move || {
        documents
            .list()
            .map_err(|err| ApiError::internal("Failed to fetch files", err))
    })
    .await
    .map(Json)
}

fn document_error(err: DocumentError, failure: &str) -> ApiError {
    match err {
        DocumentError::Path(PathError::Missing) => ApiError::bad_request("Missing path"),
        DocumentError::Path(PathError::Invalid(_) | PathError::Escapes) => {
            ApiError::bad_request("Invalid path")
        }
        DocumentError::Path(PathError::NotFound(_)) => ApiError::not_found("File not found"),
        DocumentError::UnsupportedType(_) => ApiError::bad_request("Unsupported file type"),
        DocumentError::TooLarge { .. } => ApiError::bad_request("Content too large"),
        other => ApiError::internal(failure, other),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    path: Option<String>,
}

pub async fn read_file(
    State(state): State<AppState>,
    extracted: Result<Query<PathQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let path = query(extracted)?.path.unwrap_or_default();
    let documents = state.documents.clone();
    let content = blocking(move || {
        documents
            .read(&path)
            .map_err(|err| document_error(err, "Failed to read"))
    })
    .await?;
    Ok(Json(json!({ "content": content })))
}

#[derive(Debug, Default, Deserialize)]
struct WriteFields {
    path: Option<String>,
    content: Option<String>,
}

pub async fn write_file(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let input: WriteFields = fields(parse_body(&body)?)?;
    let (Some(path), Some(content)) = (input.path, input.content) else {
        return Err(ApiError::bad_request("Missing path/content"));
    };
    let documents = state.documents.clone();
    blocking(move || {
        documents
            .write(&path, &content)
            .map_err(|err| document_error(err, "Failed to write"))
    })
    .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ApprovalQuery {
    status: Option<String>,
}

pub async fn list_approvals(
    State(state): State<AppState>,
    extracted: Result<Query<ApprovalQuery>, QueryRejection>,
) -> ApiResult<Vec<ApprovalItem>> {
    let status = query(extracted)?.status;
    let wanted = parse_with(status, ApprovalStatus::parse, "Invalid status")?;
    let store = state.store.clone();
    let mut items = blocking(move || {
        store
            .list_approvals(wanted == Some(ApprovalStatus::Pending))
            .map_err(|err| ApiError::internal("Failed to read approvals", err))
    })
    .await?;
    if let Some(wanted) = wanted {
        items.retain(|item| item.status == wanted);
    }
    Ok(Json(items))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalFields {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<String>,
    requested_by: Option<String>,
    tool_id: Option<String>,
    session_key: Option<String>,
    status: Option<String>,
}

pub async fn post_approvals(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let body = parse_body(&body)?;
    let kind = action(&body).map(str::to_string);
    let input: ApprovalFields = fields(body)?;
    let store = state.store.clone();

    match kind.as_deref() {
        Some("create") => {
            let approval_type =
                parse_with(input.kind, ApprovalType::parse, "Invalid approval type")?;
            let draft = NewApproval {
                kind: approval_type.unwrap_or_default(),
                content: input.content.unwrap_or_default(),
                requested_by: input.requested_by,
                tool_id: input.tool_id,
                session_key: input.session_key,
            };
            let item = blocking(move || {
                store
                    .create_approval(draft)
                    .map_err(|err| ApiError::internal("Failed to update approvals", err))
            })
            .await?;
            info!(approval = %item.id, kind = item.kind.as_str(), "approval requested");
            Ok(Json(json!(item)))
        }
        Some("update") => {
            let id = required_id(input.id)?;
            let decision = input
                .status
                .as_deref()
                .and_then(Decision::parse)
                .ok_or_else(|| ApiError::bad_request("Invalid status"))?;
            let outcome = blocking(move || {
                store
                    .resolve_approval(&id, decision)
                    .map_err(|err| ApiError::internal("Failed to update approvals", err))
            })
            .await?;
            match outcome {
                ResolveOutcome::Resolved(approval) => {
                    info!(
                        approval = %approval.id,
                        status = approval.status.as_str(),
                        "approval resolved"
                    );
                    Ok(Json(json!({ "success": true, "approval": approval })))
                }
                ResolveOutcome::NotFound => Err(ApiError::not_found("Approval not found")),
                ResolveOutcome::AlreadyResolved(item) => {
                    warn!(approval = %item.id, "approval already resolved");
                    Err(ApiError::Conflict("Approval already resolved".to_string()))
                }
            }
        }
        _ => Err(ApiError::bad_request("Invalid action")),
    }
}

pub async fn console_history(State(state): State<AppState>) -> ApiResult<Vec<ChatMessage>> {
    let store = state.store.clone();
    blocking(move || {
        store
            .console_history()
            .map_err(|err| ApiError::internal("Failed to read console", err))
    })
    .await
    .map(Json)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsoleFields {
    sender: Option<String>,
    agent_name: Option<String>,
    text: Option<String>,
}

pub async fn post_console(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let body = parse_body(&body)?;
    let kind = action(&body).map(str::to_string);
    let input: ConsoleFields = fields(body)?;
    let store = state.store.clone();

    match kind.as_deref() {
        Some("append") => {
            let sender = parse_with(input.sender, Sender::parse, "Invalid sender")?;
            let text = input
                .text
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| ApiError::bad_request("Missing text"))?;
            let draft = ChatDraft {
                sender: sender.unwrap_or(Sender::User),
                agent_name: input.agent_name,
                text,
            };
            let message = blocking(move || {
                store
                    .append_console(draft)
                    .map_err(|err| ApiError::internal("Failed to update console", err))
            })
            .await?;
            Ok(Json(json!(message)))
        }
        Some("clear") => {
            blocking(move || {
                store
                    .clear_console()
                    .map_err(|err| ApiError::internal("Failed to update console", err))
            })
            .await?;
            Ok(Json(json!({ "success": true })))
        }
        _ => Err(ApiError::bad_request("Invalid action")),
    }
}

pub async fn read_settings(State(state): State<AppState>) -> ApiResult<MergedSettings> {
    let store = state.store.clone();
    let external_path = state.external_config.clone();
    let workspace = state.workspace.display().to_string();
    blocking(move || {
        let doc = store
            .settings()
            .map_err(|err| ApiError::internal("Failed to read settings", err))?;
        let external = read_external_config(&external_path)
            .map_err(|err| ApiError::internal("Failed to read settings", err))?;
        Ok(merge_settings(&external, doc, &workspace))
    })
    .await
    .map(Json)
}

pub async fn save_settings(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let body = parse_body(&body)?;
    if body.get("models").is_none() && body.get("tools").is_none() {
        return Err(ApiError::bad_request("Invalid settings"));
    }
    let doc: SettingsDocument =
        serde_json::from_value(body).map_err(|_| ApiError::bad_request("Invalid settings"))?;
    if let Some(id) = doc.duplicate_tool_id() {
        return Err(ApiError::bad_request(format!("Duplicate tool id: {id}")));
    }
    let store = state.store.clone();
    let saved = doc.clone();
    blocking(move || {
        store
            .save_settings(&saved)
            .map_err(|err| ApiError::internal("Failed to save settings", err))
    })
    .await?;
    Ok(Json(json!({ "success": true, "settings": doc })))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}
