use std::time::Duration;

use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use mission_core::{Decision, TaskStatus};
use mission_view::{
    ApiClient, ClientError, KanbanBoard, KanbanError, Tab, ViewState, watch_tab_every,
};
use serde_json::json;

#[tokio::test]
async fn lists_tasks_and_reads_documents() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/tasks");
            then.status(200).json_body(json!([
                {"id": "t1", "title": "Write report", "status": "review", "priority": "high", "tags": ["q3"]}
            ]));
        })
        .await;
    let content = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/files/content")
                .query_param("path", "/memory/2026-10-15.md");
            then.status(200).json_body(json!({"content": "# Today"}));
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");
    let tasks = client.tasks().await.expect("tasks");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Review);

    let text = client
        .file_content("/memory/2026-10-15.md")
        .await
        .expect("content");
    assert_eq!(text, "# Today");
    content.assert_async().await;
}

#[tokio::test]
async fn error_bodies_become_api_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/approvals")
                .body_contains("\"status\":\"approved\"");
            then.status(404).json_body(json!({"error": "Approval not found"}));
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");
    let err = client
        .resolve_approval("a1", Decision::Approve)
        .await
        .expect_err("404");
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Approval not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn kanban_rolls_back_when_server_refuses() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/tasks");
            then.status(500).json_body(json!({"error": "Failed to update tasks"}));
        })
        .await;
    let client = ApiClient::new(&server.base_url()).expect("client");
    let mut board = KanbanBoard::new(client, vec![mission_core::Task::new("t1", "Draft")]);

    let err = board
        .move_task("t1", TaskStatus::Done)
        .await
        .expect_err("refused");
    assert!(matches!(err, KanbanError::Reverted { .. }));
    assert_eq!(board.tasks()[0].status, TaskStatus::Backlog);
    assert_eq!(board.last_error(), Some("Failed to update tasks (HTTP 500)"));
}

#[tokio::test]
async fn tab_fetch_maps_to_view_states() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/approvals").query_param("status", "pending");
            then.status(200).json_body(json!([]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/settings");
            then.status(500).json_body(json!({"error": "Failed to read settings"}));
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");
    assert_eq!(Tab::Approvals.fetch(&client).await, ViewState::Empty);
    match Tab::Settings.fetch(&client).await {
        ViewState::Error(message) => assert!(message.contains("Failed to read settings")),
        other => panic!("unexpected state: {other:?}"),
    }
}

#[tokio::test]
async fn watched_tab_fills_store_then_stops() {
    let server = MockServer::start_async().await;
    let listing = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/tasks");
            then.status(200)
                .json_body(json!([{"id": "t1", "title": "Ship", "status": "backlog"}]));
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");
    let (store, poller) = watch_tab_every(client, Tab::Kanban, Duration::from_secs(60));
    let mut updates = store.subscribe();
    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("first fetch in time")
        .expect("store alive");
    let data = store.snapshot();
    assert_eq!(data.data().expect("ready")[0]["title"], "Ship");

    poller.refresh();
    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("refresh in time")
        .expect("store alive");
    poller.shutdown().await;
    assert!(store.is_closed());
    assert_eq!(listing.hits_async().await, 2);
}
