//! In-memory fakes for `RegistryClient`/`Lease` and `RpcTransport`/
//! `RpcConnection`, gated behind the `testkit` feature.
//!
//! Used by this crate's own unit tests and re-exported so `fabric`/
//! `fabric-router`'s tests don't each re-derive a registry/transport double.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::error::{DialError, InvokeError, RegistryError};
use crate::model::{KeyValue, WatcherAction, WatcherEvent};
use crate::registry::{Lease, RegistryClient};
use crate::transport::{ConnectionState, RpcConnection, RpcTransport};

// ===== in-memory registry =====

struct RegistryState {
    kv: HashMap<String, (Vec<u8>, Option<i64>)>,
    keepalives: HashMap<i64, mpsc::UnboundedSender<()>>,
    watchers: Vec<(String, mpsc::UnboundedSender<WatcherEvent>)>,
}

/// A fake coordination store, entirely in memory, for use in tests.
///
/// Lease lifecycle is driven explicitly by the test via [`InMemoryRegistry::fire_keepalive`]
/// and [`InMemoryRegistry::kill_keepalive`] rather than a real timer, so tests
/// can deterministically exercise the Registration Agent's self-heal path
/// without sleeping through real lease TTLs.
#[derive(Clone)]
pub struct InMemoryRegistry {
    state: Arc<Mutex<RegistryState>>,
    next_lease: Arc<AtomicI64>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                kv: HashMap::new(),
                keepalives: HashMap::new(),
                watchers: Vec::new(),
            })),
            next_lease: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Sends one keepalive tick for `lease_id`, simulating a successful renewal.
    pub fn fire_keepalive(&self, lease_id: i64) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = state.keepalives.get(&lease_id) {
            let _ = tx.send(());
        }
    }

    /// Drops the keepalive sender for `lease_id`, closing its stream as if
    /// the network connection to the registry had been lost.
    pub fn kill_keepalive(&self, lease_id: i64) {
        let mut state = self.state.lock().unwrap();
        state.keepalives.remove(&lease_id);
    }

    /// True if `key` is currently present (i.e. its lease, if any, is alive).
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().unwrap().kv.contains_key(key)
    }

    pub fn value_of(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().kv.get(key).map(|(v, _)| v.clone())
    }

    fn notify(state: &RegistryState, action: WatcherAction, key: &str, value: &[u8]) {
        for (prefix, tx) in &state.watchers {
            if key.starts_with(prefix.as_str()) {
                let _ = tx.send(WatcherEvent {
                    action,
                    key: key.to_string(),
                    value: value.to_vec(),
                });
            }
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct FakeLease {
    id: i64,
    rx: mpsc::UnboundedReceiver<()>,
}

#[async_trait]
impl Lease for FakeLease {
    fn id(&self) -> i64 {
        self.id
    }

    fn keepalive(&mut self) -> BoxStream<'static, ()> {
        let (_closed_tx, closed_rx) = mpsc::unbounded_channel();
        let taken = std::mem::replace(&mut self.rx, closed_rx);
        tokio_stream::wrappers::UnboundedReceiverStream::new(taken).boxed()
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn grant(&self, _ttl_secs: i64) -> Result<Box<dyn Lease>, RegistryError> {
        let id = self.next_lease.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().keepalives.insert(id, tx);
        Ok(Box::new(FakeLease { id, rx }))
    }

    async fn put(
        &self,
        key: &str,
        value: &[u8],
        lease_id: Option<i64>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        state.kv.insert(key.to_string(), (value.to_vec(), lease_id));
        Self::notify(&state, WatcherAction::Put, key, value);
        Ok(())
    }

    async fn revoke(&self, lease_id: i64) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        state.keepalives.remove(&lease_id);
        let dead: Vec<String> = state
            .kv
            .iter()
            .filter(|(_, (_, lid))| *lid == Some(lease_id))
            .map(|(k, _)| k.clone())
            .collect();
        for key in dead {
            state.kv.remove(&key);
            Self::notify(&state, WatcherAction::Delete, &key, &[]);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        state.kv.remove(key);
        Self::notify(&state, WatcherAction::Delete, key, &[]);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<KeyValue>, RegistryError> {
        if path.is_empty() {
            return Err(RegistryError::EmptyPath);
        }
        let state = self.state.lock().unwrap();
        let prefix = path.ends_with('/');
        let mut out = Vec::new();
        for (k, (v, _)) in state.kv.iter() {
            let matches = if prefix { k.starts_with(path) } else { k == path };
            if matches {
                out.push(KeyValue {
                    key: k.clone(),
                    value: v.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn watch(&self, prefix: &str) -> Result<BoxStream<'static, WatcherEvent>, RegistryError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .unwrap()
            .watchers
            .push((prefix.to_string(), tx));
        Ok(tokio_stream::wrappers::UnboundedReceiverStream::new(rx).boxed())
    }

    async fn close(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}

// ===== fake rpc transport =====

/// Opaque echo payload used by the fake transport: `invoke` returns the
/// request bytes back as both packet and response, since the pool/router
/// never inspect payloads.
pub type FakePacket = Vec<u8>;

struct ConnState {
    state: Mutex<ConnectionState>,
}

/// A fake connection whose observed state is controlled by the test via
/// [`FakeConnection::set_state`], independent of whether `dial` "succeeded".
pub struct FakeConnection {
    uri: String,
    inner: Arc<ConnState>,
    invocations: Arc<AtomicU64>,
}

impl FakeConnection {
    pub fn set_state(&self, state: ConnectionState) {
        *self.inner.state.lock().unwrap() = state;
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcConnection for FakeConnection {
    type Request = Vec<u8>;
    type Response = Vec<u8>;
    type Packet = FakePacket;

    fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    fn set_write_timeout(&self, _timeout: Duration) {}

    async fn invoke(
        &self,
        _cmd_id: u64,
        req: Self::Request,
    ) -> Result<(Self::Packet, Self::Response), InvokeError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok((req.clone(), req))
    }

    async fn invoke_async(&self, _cmd_id: u64, _req: Self::Request) -> Result<(), InvokeError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        *self.inner.state.lock().unwrap() = ConnectionState::Closed;
    }
}

/// A fake `RpcTransport` that dials successfully by default, landing new
/// connections in `Connected` state, unless the URI has been pre-registered
/// to fail via [`FakeTransport::fail_dial`].
#[derive(Clone, Default)]
pub struct FakeTransport {
    fail: Arc<Mutex<std::collections::HashSet<String>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `dial(uri, ..)` call fail with a `DialError`.
    pub fn fail_dial(&self, uri: &str) {
        self.fail.lock().unwrap().insert(uri.to_string());
    }
}

#[async_trait]
impl RpcTransport for FakeTransport {
    type Connection = FakeConnection;

    async fn dial(&self, uri: &str, _timeout: Duration) -> Result<Self::Connection, DialError> {
        if self.fail.lock().unwrap().remove(uri) {
            return Err(DialError::Connect {
                uri: uri.to_string(),
                source: "fake transport configured to fail".to_string(),
            });
        }
        Ok(FakeConnection {
            uri: uri.to_string(),
            inner: Arc::new(ConnState {
                state: Mutex::new(ConnectionState::Connected),
            }),
            invocations: Arc::new(AtomicU64::new(0)),
        })
    }
}
