use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

/// What a tab currently shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "lowercase")]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    Empty,
    Error(String),
}

impl<T> ViewState<T> {
    pub fn from_fetch<E: Display>(
        result: Result<T, E>,
        is_empty: impl FnOnce(&T) -> bool,
    ) -> Self {
        match result {
            Ok(data) if is_empty(&data) => Self::Empty,
            Ok(data) => Self::Ready(data),
            Err(err) => Self::Error(err.to_string()),
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

impl<T> ViewState<Vec<T>> {
    pub fn from_list<E: Display>(result: Result<Vec<T>, E>) -> Self {
        Self::from_fetch(result, Vec::is_empty)
    }
}

impl ViewState<Value> {
    /// `null`, `[]` and `{}` all count as empty.
    pub fn from_json<E: Display>(result: Result<Value, E>) -> Self {
        Self::from_fetch(result, |value| match value {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        })
    }
}

/// Issued before a fetch starts; only the newest ticket may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

struct Shared<T> {
    state: watch::Sender<ViewState<T>>,
    issued: AtomicU64,
    applied: AtomicU64,
    closed: AtomicBool,
}

/// Holds one tab's state. Fetch results that complete out of order, or after
/// the view was closed, are discarded.
pub struct ViewStore<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ViewStore<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> Default for ViewStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ViewStore<T> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ViewState::Loading);
        Self {
            shared: Arc::new(Shared {
                state,
                issued: AtomicU64::new(0),
                applied: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.shared.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns whether `next` became the current state.
    pub fn apply(&self, ticket: Ticket, next: ViewState<T>) -> bool {
        if self.is_closed() {
            return false;
        }
        let applied = &self.shared.applied;
        // The watch lock serializes concurrent appliers.
        self.shared.state.send_if_modified(|current| {
            if ticket.0 <= applied.load(Ordering::SeqCst) {
                return false;
            }
            applied.store(ticket.0, Ordering::SeqCst);
            *current = next;
            true
        })
    }

    pub fn snapshot(&self) -> ViewState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState<T>> {
        self.shared.state.subscribe()
    }

    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_results_are_discarded() {
        let store: ViewStore<u32> = ViewStore::new();
        let slow = store.begin();
        let fast = store.begin();
        assert!(store.apply(fast, ViewState::Ready(2)));
        assert!(!store.apply(slow, ViewState::Ready(1)));
        assert_eq!(store.snapshot(), ViewState::Ready(2));
    }

    #[test]
    fn nothing_applies_after_close() {
        let store: ViewStore<u32> = ViewStore::new();
        let ticket = store.begin();
        store.close();
        assert!(!store.apply(ticket, ViewState::Ready(1)));
        assert!(store.snapshot().is_loading());
    }

    #[test]
    fn fetch_results_map_to_states() {
        let ok: Result<Vec<u8>, String> = Ok(vec![1]);
        assert_eq!(ViewState::from_list(ok), ViewState::Ready(vec![1]));
        let empty: Result<Vec<u8>, String> = Ok(Vec::new());
        assert_eq!(ViewState::from_list(empty), ViewState::Empty);
        let failed: Result<Vec<u8>, String> = Err("offline".to_string());
        assert_eq!(ViewState::from_list(failed), ViewState::Error("offline".to_string()));
        let blank: Result<Value, String> = Ok(serde_json::json!({}));
        assert_eq!(ViewState::from_json(blank), ViewState::Empty);
    }

    #[test]
    fn serializes_with_state_tag() {
        let state = ViewState::Ready(vec![1, 2]);
        assert_eq!(
            serde_json::to_value(&state).expect("json"),
            serde_json::json!({"state": "ready", "data": [1, 2]})
        );
        let loading: ViewState<u8> = ViewState::Loading;
        assert_eq!(
            serde_json::to_value(&loading).expect("json"),
            serde_json::json!({"state": "loading"})
        );
    }
}
