use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::state::{ViewState, ViewStore};

/// Fetches once on start, then every `interval`, until shut down. Results are
/// applied through the store's ticket guard. Dropping the poller cancels it.
pub struct Poller {
    cancel: CancellationToken,
    refresh: Arc<Notify>,
    handle: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
}

impl Poller {
    pub fn spawn<T, F, Fut>(store: ViewStore<T>, interval: Duration, fetch: F) -> Self
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ViewState<T>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let refresh = Arc::new(Notify::new());
        let handle = tokio::spawn(run(
            store,
            interval,
            fetch,
            cancel.clone(),
            Arc::clone(&refresh),
        ));
        Self {
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            refresh,
            handle,
        }
    }

    /// Requests an out-of-band fetch without waiting for the next tick.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the timer, drops any in-flight fetch, and waits for the task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn run<T, F, Fut>(
    store: ViewStore<T>,
    interval: Duration,
    fetch: F,
    cancel: CancellationToken,
    refresh: Arc<Notify>,
) where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ViewState<T>> + Send + 'static,
{
    loop {
        let ticket = store.begin();
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = fetch() => {
                if !store.apply(ticket, next) {
                    debug!("discarded stale view update");
                }
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
            _ = refresh.notified() => {}
        }
    }
    store.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(calls: Arc<AtomicUsize>) -> impl Fn() -> std::future::Ready<ViewState<usize>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(ViewState::Ready(n))
        }
    }

    #[tokio::test]
    async fn fetches_on_start_and_on_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = ViewStore::new();
        let poller = Poller::spawn(store.clone(), Duration::from_millis(20), counting(calls.clone()));
        tokio::time::sleep(Duration::from_millis(110)).await;
        poller.shutdown().await;
        let seen = calls.load(Ordering::SeqCst);
        assert!(seen >= 3, "only {seen} fetches");
        assert!(matches!(store.snapshot(), ViewState::Ready(n) if n >= 3));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn refresh_skips_the_wait() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = ViewStore::new();
        let poller = Poller::spawn(store.clone(), Duration::from_secs(60), counting(calls.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        poller.refresh();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.snapshot(), ViewState::Ready(2));
        poller.shutdown().await;
    }

    #[tokio::test]
    async fn dropping_the_poller_stops_fetching() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = ViewStore::new();
        let poller = Poller::spawn(store.clone(), Duration::from_millis(20), counting(calls.clone()));
        let token = poller.cancellation();
        tokio::time::sleep(Duration::from_millis(70)).await;
        drop(poller);
        assert!(token.is_cancelled());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let at_drop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), at_drop);
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn shutdown_drops_in_flight_fetch() {
        let store: ViewStore<usize> = ViewStore::new();
        let poller = Poller::spawn(store.clone(), Duration::from_secs(60), || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            ViewState::Ready(1)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        poller.shutdown().await;
        assert!(store.snapshot().is_loading());
        assert!(store.is_closed());
    }
}
