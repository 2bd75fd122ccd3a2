//! Connection Pool (C7): the set of connections for a single microservice
//! name, round-robin selection with liveness skipping, directed-by-server-id
//! selection.
//!
//! Bookkeeping (`addrs` + the address→connection map) is guarded by one
//! `std::sync::Mutex` taken only across the synchronous parts of each call —
//! dials and invokes are awaited with the lock released, so a selected
//! connection's I/O never serializes behind pool bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fabric_core::{uri_host, ConnectionState, InvokeError, PoolError, RpcConnection, RpcTransport, SelectionError};
use log::{debug, warn};

const DEFAULT_WRITE_TIMEOUT_MS: i64 = 3000;
const MIN_WRITE_TIMEOUT_MS: i64 = 500;
const MAX_WRITE_TIMEOUT_MS: i64 = 100_000;
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

struct Inner<C> {
    addrs: Vec<String>,
    conns: HashMap<String, Arc<C>>,
}

impl<C> Inner<C> {
    fn new() -> Self {
        Self {
            addrs: Vec::new(),
            conns: HashMap::new(),
        }
    }
}

/// A round-robin pool of RPC connections for one microservice name.
pub struct Pool<T: RpcTransport> {
    transport: Arc<T>,
    inner: Mutex<Inner<T::Connection>>,
    counter: AtomicU64,
    write_timeout_ms: AtomicI64,
}

impl<T: RpcTransport> Pool<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            inner: Mutex::new(Inner::new()),
            counter: AtomicU64::new(0),
            write_timeout_ms: AtomicI64::new(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }

    /// Sets the write timeout applied to connections dialed from now on; it
    /// is not re-applied retroactively to connections already dialed.
    pub fn set_write_timeout(&self, ms: i64) -> Result<(), PoolError> {
        if !(MIN_WRITE_TIMEOUT_MS..=MAX_WRITE_TIMEOUT_MS).contains(&ms) {
            return Err(PoolError::WriteTimeoutOutOfRange(ms));
        }
        self.write_timeout_ms.store(ms, Ordering::SeqCst);
        Ok(())
    }

    /// Dials `addr` and adds it to the rotation. Idempotent on address: a
    /// second call replaces the existing connection, closing the old one
    /// first.
    pub async fn add_host(&self, addr: &str) -> Result<(), PoolError> {
        let conn = self.transport.dial(addr, DIAL_TIMEOUT).await.map_err(|e| {
            warn!("add_host({addr}): dial failed: {e}");
            PoolError::Dial(e)
        })?;
        let ms = self.write_timeout_ms.load(Ordering::SeqCst);
        conn.set_write_timeout(Duration::from_millis(ms as u64));

        let old = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.addrs.iter().any(|a| a == addr) {
                inner.addrs.push(addr.to_string());
            }
            inner.conns.insert(addr.to_string(), Arc::new(conn))
        };
        if let Some(old_conn) = old {
            debug!("add_host({addr}): replacing existing connection");
            old_conn.close().await;
        }
        Ok(())
    }

    /// Removes `addr` from the rotation and closes its connection.
    ///
    /// Closes the connection before the pool forgets it (R2): the `Arc` is
    /// fetched under the lock, closed with the lock released, and only then
    /// is the address dropped from `addrs`/`conns`, mirroring the teacher's
    /// `Close()` then `delHost(addr)` ordering.
    pub async fn del_host(&self, addr: &str) -> Result<(), PoolError> {
        let conn = {
            let inner = self.inner.lock().unwrap();
            if !inner.addrs.iter().any(|a| a == addr) {
                return Err(PoolError::UnknownAddress(addr.to_string()));
            }
            inner.conns.get(addr).cloned()
        };
        if let Some(conn) = conn {
            conn.close().await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(i) = inner.addrs.iter().position(|a| a == addr) {
            inner.addrs.remove(i);
        }
        inner.conns.remove(addr);
        Ok(())
    }

    /// Round-robin selection with liveness skipping. Each attempt
    /// consumes a fresh increment of the shared counter, so a run of
    /// unhealthy peers shifts subsequent healthy selections rather than
    /// repeating an index.
    fn get_cli(&self) -> Result<Arc<T::Connection>, SelectionError> {
        let inner = self.inner.lock().unwrap();
        let len = inner.addrs.len();
        if len == 0 {
            return Err(SelectionError::NoneFound);
        }
        for _ in 0..len {
            let t = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let idx = (t as usize) % len;
            let addr = &inner.addrs[idx];
            if let Some(conn) = inner.conns.get(addr) {
                if conn.state() == ConnectionState::Connected {
                    return Ok(conn.clone());
                }
            }
        }
        Err(SelectionError::NoneFound)
    }

    fn get_cli_by_server_id(&self, server_id: &str) -> Result<Arc<T::Connection>, SelectionError> {
        let inner = self.inner.lock().unwrap();
        for addr in &inner.addrs {
            if uri_host(addr).as_deref() == Some(server_id) {
                if let Some(conn) = inner.conns.get(addr) {
                    return Ok(conn.clone());
                }
            }
        }
        Err(SelectionError::NoneFoundForServerId {
            server_id: server_id.to_string(),
        })
    }

    pub async fn invoke(
        &self,
        cmd_id: u64,
        req: <T::Connection as RpcConnection>::Request,
    ) -> Result<
        (
            <T::Connection as RpcConnection>::Packet,
            <T::Connection as RpcConnection>::Response,
        ),
        InvokeError,
    > {
        let conn = self.get_cli()?;
        conn.invoke(cmd_id, req).await
    }

    pub async fn invoke_async(
        &self,
        cmd_id: u64,
        req: <T::Connection as RpcConnection>::Request,
    ) -> Result<(), InvokeError> {
        let conn = self.get_cli()?;
        conn.invoke_async(cmd_id, req).await
    }

    pub async fn invoke_by_server_id(
        &self,
        server_id: &str,
        cmd_id: u64,
        req: <T::Connection as RpcConnection>::Request,
    ) -> Result<
        (
            <T::Connection as RpcConnection>::Packet,
            <T::Connection as RpcConnection>::Response,
        ),
        InvokeError,
    > {
        let conn = self.get_cli_by_server_id(server_id)?;
        conn.invoke(cmd_id, req).await
    }

    pub async fn invoke_async_by_server_id(
        &self,
        server_id: &str,
        cmd_id: u64,
        req: <T::Connection as RpcConnection>::Request,
    ) -> Result<(), InvokeError> {
        let conn = self.get_cli_by_server_id(server_id)?;
        conn.invoke_async(cmd_id, req).await
    }

    /// Snapshot of the currently registered addresses, in rotation order.
    pub fn addresses(&self) -> Vec<String> {
        self.inner.lock().unwrap().addrs.clone()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.inner.lock().unwrap().addrs.iter().any(|a| a == addr)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
