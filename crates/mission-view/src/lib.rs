//! Client-side view layer: per-tab state containers, cancellable pollers,
//! and the kanban board with rollback on failed moves.

pub mod client;
pub mod kanban;
pub mod poller;
pub mod state;
pub mod tabs;

pub use client::{ApiClient, ClientError};
pub use kanban::{KanbanBoard, KanbanError, TaskSink};
pub use poller::Poller;
pub use state::{Ticket, ViewState, ViewStore};
pub use tabs::{DashboardSummary, Tab};

use std::time::Duration;

use mission_common::PollConfig;
use serde_json::Value;

/// Starts polling `tab` against `client` into a fresh store.
pub fn watch_tab(client: ApiClient, tab: Tab, poll: &PollConfig) -> (ViewStore<Value>, Poller) {
    watch_tab_every(client, tab, tab.poll_interval(poll))
}

pub fn watch_tab_every(
    client: ApiClient,
    tab: Tab,
    interval: Duration,
) -> (ViewStore<Value>, Poller) {
    let store = ViewStore::new();
    let poller = Poller::spawn(store.clone(), interval, move || {
        let client = client.clone();
        async move { tab.fetch(&client).await }
    });
    (store, poller)
}
