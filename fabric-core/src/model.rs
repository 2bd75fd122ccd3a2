//! Wire data model for the fabric: service descriptors, listen specs, and the
//! typed configuration sections read by the config resolver.
//!
//! Field names match the wire tags a Go peer publishes exactly, so a
//! descriptor written by such a peer decodes here without translation.

use serde::{Deserialize, Serialize};

/// PPMQD TCP listener.
pub const RES_PPMQD_TCP: i32 = 1;
/// PPMQD UDP listener.
pub const RES_PPMQD_UDP: i32 = 2;
/// PPMQD MQTT listener.
pub const RES_PPMQD_MQTT: i32 = 3;
/// API gateway, gRPC.
pub const RES_APIGW_GRPC: i32 = 4;
/// API gateway, HTTP.
pub const RES_APIGW_HTTP: i32 = 5;
/// API gateway, pprpc.
pub const RES_APIGW_PPRPC: i32 = 6;
/// Frame-transport connector, NAT traversal.
pub const RES_FTCONN_NAT: i32 = 8;
/// Frame-transport connector, relay.
pub const RES_FTCONN_RELAY: i32 = 9;
/// Frame-transport connector, peer-to-peer.
pub const RES_FTCONN_P2P: i32 = 10;
/// Frame-transport connector, live streaming.
pub const RES_FTCONN_LIVES: i32 = 11;
/// Global load-balancing service, TCP.
pub const RES_GLBS_TCP: i32 = 13;
/// Global load-balancing service, UDP.
pub const RES_GLBS_UDP: i32 = 14;
/// API gateway, gRPC over TLS.
pub const RES_APIGW_GRPC_TLS: i32 = 104;
/// API gateway, HTTP over TLS.
pub const RES_APIGW_HTTP_TLS: i32 = 105;
/// API gateway, pprpc over TLS.
pub const RES_APIGW_PPRPC_TLS: i32 = 106;

/// A single listener advertised by a registered service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenSpec {
    pub uri: String,
    #[serde(rename = "read_timeout")]
    pub read_timeout_ms: i64,
    #[serde(rename = "tls_crt", default, skip_serializing_if = "Option::is_none")]
    pub tls_crt: Option<String>,
    #[serde(rename = "tls_key", default, skip_serializing_if = "Option::is_none")]
    pub tls_key: Option<String>,
    #[serde(rename = "res_id")]
    pub res_id: i32,
}

/// A service's self-published record, as stored under `/register/<region>/<name>/<lanIP>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub region: String,
    pub name: String,
    #[serde(rename = "res_srv", default)]
    pub res_srv: Vec<i32>,
    #[serde(rename = "lan_ip")]
    pub lan_ip: String,
    #[serde(default)]
    pub listen: Vec<ListenSpec>,
}

impl ServiceDescriptor {
    /// The key this descriptor is (or would be) published under.
    pub fn register_key(&self) -> String {
        format!("/register/{}/{}/{}", self.region, self.name, self.lan_ip)
    }
}

/// `tcp://<lan_ip>:<port>` for the first listen entry whose scheme is `tcp`.
///
/// Pure (no registry access) so it lives in `fabric-core` rather than the
/// `fabric` crate's config resolver, letting `fabric-router`'s Microservice
/// Router call it directly without depending on `fabric` (which itself
/// depends on `fabric-router`).
pub fn get_tcp_url(desc: &ServiceDescriptor) -> Result<String, crate::error::ConfigError> {
    use crate::error::ConfigError;

    if desc.lan_ip.is_empty() || desc.listen.is_empty() {
        return Err(ConfigError::MissingField {
            field: "lan_ip/listen",
        });
    }
    for lis in &desc.listen {
        if let Some(port) = tcp_port(&lis.uri) {
            return Ok(format!("tcp://{}:{}", desc.lan_ip, port));
        }
    }
    Err(ConfigError::NoTcpListener {
        name: desc.name.clone(),
    })
}

fn tcp_port(uri: &str) -> Option<u16> {
    let parsed = url::Url::parse(uri).ok()?;
    if parsed.scheme() != "tcp" {
        return None;
    }
    parsed.port()
}

/// The host component of a `tcp://`/`udp://` URI, used as the `serverID`
/// for directed RPC dispatch.
pub fn uri_host(uri: &str) -> Option<String> {
    url::Url::parse(uri).ok()?.host_str().map(str::to_string)
}

/// A raw key/value pair as read from the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// The kind of mutation a watch event represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherAction {
    Put,
    Delete,
}

/// One event delivered by a registry watch subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatcherEvent {
    pub action: WatcherAction,
    pub key: String,
    pub value: Vec<u8>,
}

/// WAN IP resolution value, stored at `/conf/<region>/getwanip/<lanIP>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueWan {
    pub wanip: String,
}

/// Database connection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueDbconf {
    pub conf_name: String,
    #[serde(rename = "type")]
    pub db_type: String,
    pub user: String,
    pub pass: String,
    pub host: String,
    pub port: i32,
    pub name: String,
    #[serde(default)]
    pub charset: String,
    #[serde(default)]
    pub socket: String,
    #[serde(default)]
    pub max_idle: i32,
    #[serde(default)]
    pub max_conn: i32,
    #[serde(default)]
    pub debug: bool,
}

/// Structured logging configuration for a service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueLogConf {
    pub file: String,
    pub max_size: i32,
    pub max_backups: i32,
    pub max_age: i32,
    #[serde(default)]
    pub caller: bool,
    pub level: i8,
    #[serde(default)]
    pub seelog_port: i32,
    #[serde(default)]
    pub seelog_user: String,
    #[serde(default)]
    pub seelog_pass: String,
    #[serde(default)]
    pub log_dir: String,
}

/// Message-broker client configuration, with the `localmqd`/`ppmqd` classes
/// cross-resolved against the registry by the config resolver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PpmqcliConf {
    pub class: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "hw_feature", default)]
    pub hw_feature: String,
    #[serde(default)]
    pub topic_prefix: String,
    #[serde(default)]
    pub msg_type: i32,
    #[serde(default)]
    pub msg_count: i32,
}

/// Process-wide public configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicConf {
    pub report_interval: i64,
    #[serde(default)]
    pub admin_prof: bool,
    #[serde(default)]
    pub admin_port: i32,
    #[serde(default)]
    pub max_go: i32,
    #[serde(default)]
    pub run_go: bool,
    /// Filled in by the resolver from the caller's `lanIP`, never read from the wire.
    #[serde(default)]
    pub server_id: String,
}

/// The aggregate of every configuration section for one service instance.
#[derive(Clone, Debug, Default)]
pub struct MsConfig {
    pub public: Option<PublicConf>,
    pub listen: Vec<ListenSpec>,
    pub log: Option<ValueLogConf>,
    pub dbs: Vec<ValueDbconf>,
    pub ppmqclis: Vec<PpmqcliConf>,
    pub private_config: Option<serde_json::Value>,
}
