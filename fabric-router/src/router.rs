//! Microservice Router (C8): a name-indexed collection of pools, plus the
//! local registration cache binding discovery keys to the descriptor
//! currently advertised under them.
//!
//! Name lookup is a linear scan over `pools`, intentionally, since the
//! number of configured microservice names per process is small and fixed.

use std::sync::{Arc, Mutex};

use fabric_core::{get_tcp_url, NotFoundError, RouterError, RpcConnection, RpcTransport, ServiceDescriptor};

use crate::pool::Pool;

/// The cache capacity backing the Router's registration cache.
const REGISTRATION_CACHE_CAPACITY: usize = 10_000;

struct NamedPool<T: RpcTransport> {
    name: String,
    pool: Arc<Pool<T>>,
}

/// A named collection of connection pools, plus the discovery-key → descriptor
/// cache that `add_host`/`del_host` keep in sync with pool membership.
pub struct Router<T: RpcTransport> {
    transport: Arc<T>,
    pools: Mutex<Vec<NamedPool<T>>>,
    reg_cache: Mutex<fabric_core::cache::Cache<String, ServiceDescriptor>>,
}

impl<T: RpcTransport> Router<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            pools: Mutex::new(Vec::new()),
            reg_cache: Mutex::new(fabric_core::cache::Cache::new(REGISTRATION_CACHE_CAPACITY)),
        }
    }

    /// Creates an empty pool under `name`. Names are unique.
    pub fn add_micro(&self, name: &str) -> Result<(), RouterError> {
        let mut pools = self.pools.lock().unwrap();
        if pools.iter().any(|p| p.name == name) {
            return Err(RouterError::DuplicateMicro(name.to_string()));
        }
        pools.push(NamedPool {
            name: name.to_string(),
            pool: Arc::new(Pool::new(self.transport.clone())),
        });
        Ok(())
    }

    fn find(&self, name: &str) -> Option<Arc<Pool<T>>> {
        self.pools
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.pool.clone())
    }

    pub async fn invoke(
        &self,
        name: &str,
        cmd_id: u64,
        req: <T::Connection as RpcConnection>::Request,
    ) -> Result<
        (
            <T::Connection as RpcConnection>::Packet,
            <T::Connection as RpcConnection>::Response,
        ),
        RouterError,
    > {
        let pool = self
            .find(name)
            .ok_or_else(|| NotFoundError::Name(name.to_string()))?;
        Ok(pool.invoke(cmd_id, req).await?)
    }

    pub async fn invoke_server_id(
        &self,
        name: &str,
        server_id: &str,
        cmd_id: u64,
        req: <T::Connection as RpcConnection>::Request,
    ) -> Result<
        (
            <T::Connection as RpcConnection>::Packet,
            <T::Connection as RpcConnection>::Response,
        ),
        RouterError,
    > {
        let pool = self
            .find(name)
            .ok_or_else(|| NotFoundError::Name(name.to_string()))?;
        Ok(pool.invoke_by_server_id(server_id, cmd_id, req).await?)
    }

    /// Binds a discovery PUT: computes `descriptor`'s TCP URL, adds it to the
    /// pool named by `descriptor.name`, and on success records
    /// `key -> descriptor` in the registration cache.
    pub async fn add_host(&self, key: &str, descriptor: ServiceDescriptor) -> Result<(), RouterError> {
        let pool = self
            .find(&descriptor.name)
            .ok_or_else(|| NotFoundError::Name(descriptor.name.clone()))?;
        let url = get_tcp_url(&descriptor)?;
        pool.add_host(&url).await?;
        self.reg_cache.lock().unwrap().add_or_update(key.to_string(), descriptor);
        Ok(())
    }

    /// Binds a discovery DELETE: looks up the descriptor previously recorded
    /// for `key`, removes its address from the corresponding pool, and
    /// forgets `key` from the registration cache.
    pub async fn del_host(&self, key: &str) -> Result<(), RouterError> {
        let descriptor = {
            let cache = self.reg_cache.lock().unwrap();
            cache
                .get(&key.to_string())
                .cloned()
                .ok_or_else(|| NotFoundError::Key(key.to_string()))?
        };
        let pool = self
            .find(&descriptor.name)
            .ok_or_else(|| NotFoundError::Name(descriptor.name.clone()))?;
        let url = get_tcp_url(&descriptor)?;
        pool.del_host(&url).await?;
        self.reg_cache.lock().unwrap().delete(&key.to_string());
        Ok(())
    }

    /// True if `key` currently has a live registration-cache entry.
    pub fn has_registration(&self, key: &str) -> bool {
        self.reg_cache.lock().unwrap().contains_key(&key.to_string())
    }

    /// The pool registered under `name`, if any (test/introspection helper).
    pub fn pool(&self, name: &str) -> Option<Arc<Pool<T>>> {
        self.find(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::testkit::FakeTransport;
    use fabric_core::ListenSpec;

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

    fn router() -> Router<FakeTransport> {
        Router::new(Arc::new(FakeTransport::new()))
    }

    #[test]
    fn add_micro_rejects_duplicate_names() {
        let r = router();
        r.add_micro("svc").unwrap();
        assert!(matches!(
            r.add_micro("svc").unwrap_err(),
            RouterError::DuplicateMicro(_)
        ));
    }

    #[tokio::test]
    async fn invoke_unknown_micro_errors() {
        let r = router();
        let err = r.invoke("svc", 1, b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, RouterError::NotFound(NotFoundError::Name(_))));
    }

    #[tokio::test]
    async fn add_host_binds_descriptor_then_invoke_reaches_it() {
        let r = router();
        r.add_micro("svc").unwrap();
        let desc = descriptor("svc", "1.2.3.4", 9000);
        r.add_host("k1", desc).await.unwrap();

        assert!(r.has_registration("k1"));
        assert_eq!(r.pool("svc").unwrap().addresses(), vec!["tcp://1.2.3.4:9000".to_string()]);

        let (_, resp) = r.invoke("svc", 1, b"ping".to_vec()).await.unwrap();
        assert_eq!(resp, b"ping".to_vec());
    }

    #[tokio::test]
    async fn del_host_removes_address_and_cache_entry() {
        let r = router();
        r.add_micro("svc").unwrap();
        let desc = descriptor("svc", "1.2.3.4", 9000);
        r.add_host("k1", desc).await.unwrap();

        r.del_host("k1").await.unwrap();

        assert!(!r.has_registration("k1"));
        assert!(r.pool("svc").unwrap().is_empty());
    }

    #[tokio::test]
    async fn del_host_unknown_key_errors() {
        let r = router();
        r.add_micro("svc").unwrap();
        let err = r.del_host("ghost").await.unwrap_err();
        assert!(matches!(err, RouterError::NotFound(NotFoundError::Key(_))));
    }

    #[tokio::test]
    async fn add_host_for_unregistered_micro_errors_and_does_not_cache() {
        let r = router();
        let desc = descriptor("svc", "1.2.3.4", 9000);
        let err = r.add_host("k1", desc).await.unwrap_err();
        assert!(matches!(err, RouterError::NotFound(NotFoundError::Name(_))));
        assert!(!r.has_registration("k1"));
    }
}
