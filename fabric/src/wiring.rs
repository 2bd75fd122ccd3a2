//! Discovery → Router binding.
//!
//! Translates a [`DiscoveryWatcher`](crate::discovery::DiscoveryWatcher)
//! callback into `Router::add_host`/`Router::del_host` calls, so the router
//! stays authoritative only over what the watcher has observed. Each event
//! spawns its own task so a slow `AddHost` dial never blocks the watcher
//! from processing the next event.

use std::sync::Arc;

use fabric_core::{ServiceDescriptor, WatcherAction};
use fabric_router::Router;
use log::warn;

/// Returns a callback suitable for [`DiscoveryWatcher::new`](crate::discovery::DiscoveryWatcher::new)
/// that keeps `router`'s pools in sync with discovery events.
pub fn bind_router<T>(router: Arc<Router<T>>) -> impl Fn(WatcherAction, &str, &[u8]) + Send + Sync + 'static
where
    T: fabric_core::RpcTransport + Send + Sync + 'static,
    T::Connection: Send + Sync + 'static,
{
    move |action, key, value| {
        let router = router.clone();
        let key = key.to_string();
        let value = value.to_vec();
        tokio::spawn(async move {
            match action {
                WatcherAction::Put => match serde_json::from_slice::<ServiceDescriptor>(&value) {
                    Ok(descriptor) => {
                        if let Err(e) = router.add_host(&key, descriptor).await {
                            warn!("bind_router: add_host({key}) failed: {e}");
                        }
                    }
                    Err(e) => warn!("bind_router: decode descriptor at {key} failed: {e}"),
                },
                WatcherAction::Delete => {
                    if let Err(e) = router.del_host(&key).await {
                        warn!("bind_router: del_host({key}) failed: {e}");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryWatcher;
    use fabric_core::testkit::{FakeTransport, InMemoryRegistry};
    use fabric_core::ListenSpec;
    use std::time::Duration;

    fn descriptor(name: &str, lan_ip: &str, port: u16) -> ServiceDescriptor {
        ServiceDescriptor {
            region: "r1".to_string(),
            name: name.to_string(),
            res_srv: vec![],
            lan_ip: lan_ip.to_string(),
            listen: vec![ListenSpec {
                uri: format!("tcp://{lan_ip}:{port}"),
                read_timeout_ms: 3000,
                tls_crt: None,
                tls_key: None,
                res_id: 1,
            }],
        }
    }

    #[tokio::test]
    async fn put_event_adds_host_and_delete_removes_it() {
        let registry = Arc::new(InMemoryRegistry::new());
        let router = Arc::new(Router::new(Arc::new(FakeTransport::new())));
        router.add_micro("svc").unwrap();

        let watcher = DiscoveryWatcher::new(registry.clone(), "/register/r1/", bind_router(router.clone()));
        let _handle = watcher.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let desc = descriptor("svc", "1.2.3.4", 9000);
        registry
            .put(
                "/register/r1/svc/1.2.3.4",
                &serde_json::to_vec(&desc).unwrap(),
                None,
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            router.pool("svc").unwrap().addresses(),
            vec!["tcp://1.2.3.4:9000".to_string()]
        );

        registry.delete("/register/r1/svc/1.2.3.4").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(router.pool("svc").unwrap().is_empty());
    }
}
