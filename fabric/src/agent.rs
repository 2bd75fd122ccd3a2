//! Registration Agent (C4): publish self, keep the lease alive, revoke on
//! shutdown, self-heal on lease loss.
//!
//! A goto-style retry loop becomes an explicit supervised loop here: `run`
//! loops between dialing a fresh lease and riding its keepalive stream until
//! cancellation or an unrecoverable error.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fabric_core::{Lease, RegistryClient, RegistryError, ServiceDescriptor};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const MIN_LEASE_SECS: i64 = 5;
const MAX_LEASE_SECS: i64 = 60;
const RETRY_BACKOFF: Duration = Duration::from_secs(5);
const STOP_DELETE_DEADLINE: Duration = Duration::from_secs(3);

/// Publishes `descriptor` under its registry key and keeps it alive.
///
/// `start` is non-blocking: it spawns the supervisor task and returns a
/// handle. The supervisor runs until [`RegistrationAgent::stop`] cancels it.
pub struct RegistrationAgent<R: RegistryClient> {
    client: Arc<R>,
    key: String,
    descriptor: ServiceDescriptor,
    lease_time_secs: i64,
    cancel: CancellationToken,
    current_lease_id: AtomicI64,
}

impl<R: RegistryClient + 'static> RegistrationAgent<R> {
    /// `lease_time_secs` is clamped to `[5, 60]`.
    pub fn new(client: Arc<R>, descriptor: ServiceDescriptor, lease_time_secs: i64) -> Arc<Self> {
        let lease_time_secs = lease_time_secs.clamp(MIN_LEASE_SECS, MAX_LEASE_SECS);
        let key = descriptor.register_key();
        Arc::new(Self {
            client,
            key,
            descriptor,
            lease_time_secs,
            cancel: CancellationToken::new(),
            current_lease_id: AtomicI64::new(0),
        })
    }

    /// The key this agent publishes under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The lease id currently backing the published key, if any.
    pub fn current_lease_id(&self) -> Option<i64> {
        match self.current_lease_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// Spawns the supervisor loop. Non-blocking.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run().await })
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            match self.connect_and_ride_lease().await {
                Ok(()) => {
                    // Either the keepalive stream closed (rejoin) or we were
                    // cancelled mid-lease; connect_and_ride_lease already
                    // handled revocation in both cases.
                    if self.cancel.is_cancelled() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(
                        "registration agent: {} failed: {e}, retrying in {:?}",
                        self.key, RETRY_BACKOFF
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                        _ = self.cancel.cancelled() => return,
                    }
                }
            }
        }
    }

    /// Grants a lease, PUTs the descriptor under it, then rides the
    /// keepalive stream until it closes or the supervisor is cancelled.
    async fn connect_and_ride_lease(&self) -> Result<(), RegistryError> {
        let mut lease = self.client.grant(self.lease_time_secs).await?;
        let lease_id = lease.id();
        self.current_lease_id.store(lease_id, Ordering::SeqCst);
        debug!("granted lease {lease_id:x} for {}", self.key);

        let value = serde_json::to_vec(&self.descriptor).map_err(|e| RegistryError::Put {
            key: self.key.clone(),
            source: e.to_string(),
        })?;
        self.client.put(&self.key, &value, Some(lease_id)).await?;
        info!("registered {} under lease {lease_id:x}", self.key);

        let mut keepalive = lease.keepalive();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = self.client.revoke(lease_id).await {
                        warn!("revoke({lease_id:x}) on stop failed: {e}");
                    }
                    return Ok(());
                }
                tick = keepalive.next() => {
                    match tick {
                        Some(()) => continue,
                        None => {
                            warn!(
                                "keepalive closed for {} (lease {lease_id:x}), rejoining",
                                self.key
                            );
                            if let Err(e) = self.client.revoke(lease_id).await {
                                warn!("revoke({lease_id:x}) on rejoin failed: {e}");
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Deletes the registered key (3 s deadline), cancels the supervisor, and
    /// closes the registry handle. Idempotent.
    pub async fn stop(&self) -> Result<(), RegistryError> {
        let delete_result =
            tokio::time::timeout(STOP_DELETE_DEADLINE, self.client.delete(&self.key)).await;
        self.cancel.cancel();
        let close_result = self.client.close().await;

        match delete_result {
            Ok(r) => {
                r?;
            }
            Err(_) => {
                return Err(RegistryError::Delete {
                    key: self.key.clone(),
                    source: "timed out after 3s".to_string(),
                });
            }
        }
        close_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::model::ListenSpec;
    use fabric_core::testkit::InMemoryRegistry;

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            region: "r1".to_string(),
            name: "svc".to_string(),
            res_srv: vec![],
            lan_ip: "1.1.1.1".to_string(),
            listen: vec![ListenSpec {
                uri: "tcp://1.1.1.1:9000".to_string(),
                read_timeout_ms: 3000,
                tls_crt: None,
                tls_key: None,
                res_id: 1,
            }],
        }
    }

    #[tokio::test]
    async fn start_publishes_descriptor() {
        let registry = Arc::new(InMemoryRegistry::new());
        let agent = RegistrationAgent::new(registry.clone(), descriptor(), 5);
        let _handle = agent.start();

        // Give the spawned supervisor a turn to run.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(registry.contains_key("/register/r1/svc/1.1.1.1"));
        let value = registry.value_of("/register/r1/svc/1.1.1.1").unwrap();
        let decoded: ServiceDescriptor = serde_json::from_slice(&value).unwrap();
        assert_eq!(decoded, descriptor());
    }

    #[tokio::test]
    async fn self_heals_on_keepalive_close() {
        let registry = Arc::new(InMemoryRegistry::new());
        let agent = RegistrationAgent::new(registry.clone(), descriptor(), 5);
        let _handle = agent.start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first_lease = agent.current_lease_id().unwrap();
        assert!(registry.contains_key("/register/r1/svc/1.1.1.1"));

        registry.kill_keepalive(first_lease);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second_lease = agent.current_lease_id().unwrap();
        assert_ne!(first_lease, second_lease);
        assert!(registry.contains_key("/register/r1/svc/1.1.1.1"));
    }

    #[tokio::test]
    async fn stop_deletes_key_and_is_idempotent() {
        let registry = Arc::new(InMemoryRegistry::new());
        let agent = RegistrationAgent::new(registry.clone(), descriptor(), 5);
        let _handle = agent.start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        agent.stop().await.unwrap();
        assert!(!registry.contains_key("/register/r1/svc/1.1.1.1"));

        // Idempotent: deleting an already-absent key is not an error.
        agent.stop().await.unwrap();
    }
}
