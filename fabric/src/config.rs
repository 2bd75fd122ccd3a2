//! Config Resolver (C6): typed readers over `/conf/<region>/<lanIP>/<name>/<section>`,
//! plus the `ppmqcli` cross-resolution and `GetTCPURL`/`GetWanIP` lookups.

use std::sync::Arc;
use std::time::Duration;

use fabric_core::{
    get_tcp_url, ConfigError, KeyValue, ListenSpec, MsConfig, PpmqcliConf, PublicConf,
    RegistryClient, RegistryError, ServiceDescriptor, ValueDbconf, ValueLogConf,
};
use log::warn;
use serde::de::DeserializeOwned;

const READ_DEADLINE: Duration = Duration::from_secs(3);

/// Reads and resolves the typed configuration sections for one service
/// instance (`region`/`lan_ip`/`name`), plus any named databases.
pub struct ConfigResolver<R: RegistryClient> {
    client: Arc<R>,
    region: String,
    lan_ip: String,
    name: String,
    dbs: Vec<String>,
    resolve_private: bool,
}

impl<R: RegistryClient> ConfigResolver<R> {
    pub fn new(
        client: Arc<R>,
        region: impl Into<String>,
        lan_ip: impl Into<String>,
        name: impl Into<String>,
        dbs: Vec<String>,
        resolve_private: bool,
    ) -> Result<Self, ConfigError> {
        let region = region.into();
        let lan_ip = lan_ip.into();
        let name = name.into();
        if region.is_empty() || lan_ip.is_empty() || name.is_empty() {
            return Err(ConfigError::MissingField {
                field: "region/lan_ip/name",
            });
        }
        Ok(Self {
            client,
            region,
            lan_ip,
            name,
            dbs,
            resolve_private,
        })
    }

    async fn get_values(&self, key: &str) -> Result<Vec<KeyValue>, ConfigError> {
        let result = tokio::time::timeout(READ_DEADLINE, self.client.get(key))
            .await
            .map_err(|_| {
                ConfigError::Registry(RegistryError::Get {
                    key: key.to_string(),
                    source: "timed out after 3s".to_string(),
                })
            })?;
        Ok(result?)
    }

    async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let kvs = self.get_values(key).await?;
        let first = kvs
            .into_iter()
            .next()
            .ok_or_else(|| ConfigError::Registry(RegistryError::NotFound(key.to_string())))?;
        serde_json::from_slice(&first.value).map_err(|e| ConfigError::Decode {
            key: key.to_string(),
            source: e,
        })
    }

    fn section_key(&self, section: &str) -> String {
        format!("/conf/{}/{}/{}/{section}", self.region, self.lan_ip, self.name)
    }

    /// `/conf/<region>/<lan_ip>/<name>/public`; `server_id` is filled in from
    /// `lan_ip`, never read from the wire.
    pub async fn public(&self) -> Result<PublicConf, ConfigError> {
        let key = self.section_key("public");
        let mut conf: PublicConf = self.get_value(&key).await?;
        conf.server_id = self.lan_ip.clone();
        Ok(conf)
    }

    /// `/conf/<region>/<lan_ip>/<name>/listen`.
    pub async fn listen(&self) -> Result<Vec<ListenSpec>, ConfigError> {
        let key = self.section_key("listen");
        self.get_value(&key).await
    }

    /// `/conf/<region>/<lan_ip>/<name>/log`.
    pub async fn log(&self) -> Result<ValueLogConf, ConfigError> {
        let key = self.section_key("log");
        self.get_value(&key).await
    }

    /// `/conf/<region>/db/<db_name>`.
    pub async fn db(&self, db_name: &str) -> Result<ValueDbconf, ConfigError> {
        let key = format!("/conf/{}/db/{db_name}", self.region);
        self.get_value(&key).await
    }

    /// Resolves every database named at construction time, in order.
    pub async fn dbs(&self) -> Result<Vec<ValueDbconf>, ConfigError> {
        let mut out = Vec::with_capacity(self.dbs.len());
        for db_name in &self.dbs {
            out.push(self.db(db_name).await?);
        }
        Ok(out)
    }

    /// `/conf/<region>/<lan_ip>/<name>/ppmqcli`, cross-resolving `localmqd`/
    /// `ppmqd` entries' `url` against their registered service.
    pub async fn ppmqcli(&self) -> Result<Vec<PpmqcliConf>, ConfigError> {
        let key = self.section_key("ppmqcli");
        let entries: Vec<PpmqcliConf> = self.get_value(&key).await?;

        let mut resolved = Vec::with_capacity(entries.len());
        for mut entry in entries {
            if entry.class == "localmqd" || entry.class == "ppmqd" {
                entry.hw_feature = format!(
                    "{}-{}-{}-{}",
                    entry.class, self.region, self.lan_ip, self.name
                );
                let reg_key = format!("/register/{}/{}/", self.region, entry.class);
                let desc: ServiceDescriptor = self.get_value(&reg_key).await?;
                entry.url = get_tcp_url(&desc)?;
            }
            resolved.push(entry);
        }
        Ok(resolved)
    }

    /// `/conf/<region>/<lan_ip>/<name>/private`, as opaque JSON.
    pub async fn private(&self) -> Result<serde_json::Value, ConfigError> {
        let key = self.section_key("private");
        self.get_value(&key).await
    }

    /// `/conf/<region>/getwanip/<lan_ip>` — a bare string value, not a JSON
    /// object, though this accepts it JSON-encoded for decode-path
    /// uniformity.
    pub async fn get_wan_ip(&self, lan_ip: &str) -> Result<String, ConfigError> {
        let key = format!("/conf/{}/getwanip/{lan_ip}", self.region);
        let kvs = self.get_values(&key).await?;
        let first = kvs
            .into_iter()
            .next()
            .ok_or_else(|| ConfigError::Registry(RegistryError::NotFound(key.clone())))?;
        Ok(String::from_utf8_lossy(&first.value).into_owned())
    }

    /// Resolves `public`, `listen`, `log`, the requested databases, and
    /// `ppmqcli` (tolerating its failure as a logged warning), plus
    /// `private` when `resolve_private` was set.
    pub async fn all(&self) -> Result<MsConfig, ConfigError> {
        let mut conf = MsConfig {
            public: Some(self.public().await?),
            listen: self.listen().await?,
            log: Some(self.log().await?),
            dbs: self.dbs().await?,
            ..Default::default()
        };

        match self.ppmqcli().await {
            Ok(v) => conf.ppmqclis = v,
            Err(e) => warn!("ConfigResolver::all: ppmqcli() failed (non-fatal): {e}"),
        }

        if self.resolve_private {
            conf.private_config = Some(self.private().await?);
        }

        Ok(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::testkit::InMemoryRegistry;
    use fabric_core::ListenSpec;

    async fn put_json<T: serde::Serialize>(registry: &InMemoryRegistry, key: &str, value: &T) {
        registry
            .put(key, &serde_json::to_vec(value).unwrap(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn public_resolves_and_fills_server_id() {
        let registry = InMemoryRegistry::new();
        put_json(
            &registry,
            "/conf/r1/1.1.1.1/svc/public",
            &serde_json::json!({"report_interval": 30}),
        )
        .await;

        let resolver =
            ConfigResolver::new(Arc::new(registry), "r1", "1.1.1.1", "svc", vec![], false).unwrap();
        let public = resolver.public().await.unwrap();
        assert_eq!(public.report_interval, 30);
        assert_eq!(public.server_id, "1.1.1.1");
    }

    #[tokio::test]
    async fn missing_key_is_error() {
        let registry = InMemoryRegistry::new();
        let resolver =
            ConfigResolver::new(Arc::new(registry), "r1", "1.1.1.1", "svc", vec![], false).unwrap();
        let err = resolver.public().await.unwrap_err();
        assert!(matches!(err, ConfigError::Registry(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn ppmqcli_cross_resolves_localmqd_url() {
        let registry = InMemoryRegistry::new();
        put_json(
            &registry,
            "/conf/r1/1.1.1.1/svc/ppmqcli",
            &vec![PpmqcliConf {
                class: "localmqd".to_string(),
                url: String::new(),
                account: String::new(),
                password: String::new(),
                hw_feature: String::new(),
                topic_prefix: String::new(),
                msg_type: 0,
                msg_count: 0,
            }],
        )
        .await;
        put_json(
            &registry,
            "/register/r1/localmqd/9.9.9.9",
            &ServiceDescriptor {
                region: "r1".to_string(),
                name: "localmqd".to_string(),
                res_srv: vec![],
                lan_ip: "9.9.9.9".to_string(),
                listen: vec![ListenSpec {
                    uri: "tcp://9.9.9.9:7000".to_string(),
                    read_timeout_ms: 3000,
                    tls_crt: None,
                    tls_key: None,
                    res_id: 1,
                }],
            },
        )
        .await;

        let resolver =
            ConfigResolver::new(Arc::new(registry), "r1", "1.1.1.1", "svc", vec![], false).unwrap();
        let clis = resolver.ppmqcli().await.unwrap();
        assert_eq!(clis.len(), 1);
        assert_eq!(clis[0].url, "tcp://9.9.9.9:7000");
        assert_eq!(clis[0].hw_feature, "localmqd-r1-1.1.1.1-svc");
    }

    #[tokio::test]
    async fn all_tolerates_ppmqcli_failure() {
        let registry = InMemoryRegistry::new();
        put_json(
            &registry,
            "/conf/r1/1.1.1.1/svc/public",
            &serde_json::json!({"report_interval": 1}),
        )
        .await;
        put_json(&registry, "/conf/r1/1.1.1.1/svc/listen", &Vec::<ListenSpec>::new()).await;
        put_json(
            &registry,
            "/conf/r1/1.1.1.1/svc/log",
            &serde_json::json!({"file": "x", "max_size": 1, "max_backups": 1, "max_age": 1, "level": 0}),
        )
        .await;
        // ppmqcli deliberately left unset: all() should log and continue.

        let resolver =
            ConfigResolver::new(Arc::new(registry), "r1", "1.1.1.1", "svc", vec![], false).unwrap();
        let conf = resolver.all().await.unwrap();
        assert!(conf.public.is_some());
        assert!(conf.ppmqclis.is_empty());
    }
}
