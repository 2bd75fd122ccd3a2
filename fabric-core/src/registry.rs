//! The registry contract (C1): a KV store with leases and prefix watches,
//! implemented externally and modeled here purely as a trait.
//!
//! Mirrors an etcd-style `clientv3.Client`: grant/put/keepalive/watch/revoke/get,
//! each `async fn` since every call crosses the process boundary.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RegistryError;
use crate::model::{KeyValue, WatcherEvent};

/// A lease granted by the registry. Owns at most one published key.
#[async_trait]
pub trait Lease: Send + Sync {
    /// The registry-assigned lease identifier.
    fn id(&self) -> i64;

    /// A stream that yields once per successful keepalive renewal and ends
    /// when the keepalive channel closes (network loss, lease expiry, or the
    /// registry revoking it from under us).
    fn keepalive(&mut self) -> BoxStream<'static, ()>;
}

/// Primitive KV + lease + watch operations against the coordination store.
///
/// Implementations are expected to be cheap to clone or already internally
/// shared (an `Arc`-wrapped client), since agent and watcher tasks each hold
/// their own handle for the duration of their lifecycle.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Grants a lease for `ttl_secs` seconds. Callers clamp `ttl_secs` to
    /// `[5, 60]` themselves before calling.
    async fn grant(&self, ttl_secs: i64) -> Result<Box<dyn Lease>, RegistryError>;

    /// Writes `value` at `key`, bound to `lease_id` if `Some`.
    async fn put(&self, key: &str, value: &[u8], lease_id: Option<i64>)
        -> Result<(), RegistryError>;

    /// Revokes a lease, atomically removing any key bound to it.
    async fn revoke(&self, lease_id: i64) -> Result<(), RegistryError>;

    /// Deletes `key` unconditionally (used by the agent's `Stop`).
    async fn delete(&self, key: &str) -> Result<(), RegistryError>;

    /// Reads `path`. A trailing `/` means prefix read; otherwise exact.
    async fn get(&self, path: &str) -> Result<Vec<KeyValue>, RegistryError>;

    /// Subscribes to all PUT/DELETE events under `prefix`.
    async fn watch(&self, prefix: &str) -> Result<BoxStream<'static, WatcherEvent>, RegistryError>;

    /// Releases the underlying client connection. Idempotent.
    async fn close(&self) -> Result<(), RegistryError>;
}
