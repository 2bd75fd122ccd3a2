//! Discovery Watcher (C5): subscribe to a key prefix, mirror PUT/DELETE
//! events into a local cache, and notify a callback in arrival order.
//!
//! No reconnect loop runs on channel close; callers that want resilience
//! restart the watcher rather than have it invent a backoff policy.

use std::sync::{Arc, Mutex};

use fabric_core::cache::Cache;
use fabric_core::{KeyValue, RegistryClient, RegistryError, WatcherAction, WatcherEvent};
use futures::StreamExt;
use log::{error, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DISCOVERY_CACHE_CAPACITY: usize = 2_000;

/// A callback invoked once per watch event, in arrival order, with no
/// concurrent invocations for a given watcher instance.
pub type WatcherCallback = dyn Fn(WatcherAction, &str, &[u8]) + Send + Sync;

/// Subscribes to a registry key prefix and mirrors it into a local cache.
pub struct DiscoveryWatcher<R: RegistryClient> {
    client: Arc<R>,
    prefix: String,
    cache: Mutex<Cache<String, Vec<u8>>>,
    cancel: CancellationToken,
    callback: Box<WatcherCallback>,
}

impl<R: RegistryClient + 'static> DiscoveryWatcher<R> {
    pub fn new(
        client: Arc<R>,
        prefix: impl Into<String>,
        callback: impl Fn(WatcherAction, &str, &[u8]) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            prefix: prefix.into(),
            cache: Mutex::new(Cache::new(DISCOVERY_CACHE_CAPACITY)),
            cancel: CancellationToken::new(),
            callback: Box::new(callback),
        })
    }

    /// Spawns the subscription loop. Non-blocking.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run().await })
    }

    async fn run(self: Arc<Self>) {
        let mut stream = match self.client.watch(&self.prefix).await {
            Ok(s) => s,
            Err(e) => {
                error!("watch({}) failed: {e}", self.prefix);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return;
                }
                event = stream.next() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            warn!(
                                "watch channel for {} closed; not re-subscribing (documented behavior)",
                                self.prefix
                            );
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle_event(&self, event: WatcherEvent) {
        match event.action {
            WatcherAction::Put => {
                self.cache
                    .lock()
                    .unwrap()
                    .add_or_update(event.key.clone(), event.value.clone());
            }
            WatcherAction::Delete => {
                self.cache.lock().unwrap().delete(&event.key);
            }
        }
        (self.callback)(event.action, &event.key, &event.value);
    }

    /// Cancels the subscription and closes the registry handle.
    pub async fn stop(&self) -> Result<(), RegistryError> {
        self.cancel.cancel();
        self.client.close().await
    }

    /// One-shot read: prefix query if `path` ends with `/`, else exact.
    pub async fn get_values(&self, path: &str) -> Result<Vec<KeyValue>, RegistryError> {
        if path.is_empty() {
            return Err(RegistryError::EmptyPath);
        }
        self.client.get(path).await
    }

    /// The value mirrored locally for `key`, if the watcher has seen it.
    pub fn cached(&self, key: &str) -> Option<Vec<u8>> {
        self.cache.lock().unwrap().get(&key.to_string()).cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::testkit::InMemoryRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn mirrors_put_and_delete_and_calls_back_in_order() {
        let registry = Arc::new(InMemoryRegistry::new());
        let events: Arc<Mutex<Vec<(String, String, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
        let events_cb = events.clone();

        let watcher = DiscoveryWatcher::new(registry.clone(), "/register/r1/", move |action, key, value| {
            let action = match action {
                WatcherAction::Put => "PUT",
                WatcherAction::Delete => "DELETE",
            };
            events_cb
                .lock()
                .unwrap()
                .push((action.to_string(), key.to_string(), value.to_vec()));
        });
        let _handle = watcher.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        registry
            .put("/register/r1/svc/1.2.3.4", b"hello", None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(watcher.cached("/register/r1/svc/1.2.3.4"), Some(b"hello".to_vec()));

        registry.delete("/register/r1/svc/1.2.3.4").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(watcher.cached("/register/r1/svc/1.2.3.4"), None);

        let seen = events.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "PUT");
        assert_eq!(seen[1].0, "DELETE");
    }

    #[tokio::test]
    async fn callback_invoked_exactly_once_per_event() {
        let registry = Arc::new(InMemoryRegistry::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = count.clone();

        let watcher = DiscoveryWatcher::new(registry.clone(), "/register/r1/", move |_, _, _| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        });
        let _handle = watcher.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        for i in 0..5 {
            registry
                .put(&format!("/register/r1/svc/{i}"), b"x", None)
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn get_values_rejects_empty_path() {
        let registry = Arc::new(InMemoryRegistry::new());
        let watcher = DiscoveryWatcher::new(registry, "/register/r1/", |_, _, _| {});
        let err = watcher.get_values("").await.unwrap_err();
        assert!(matches!(err, RegistryError::EmptyPath));
    }
}
