//! Error taxonomy shared across the fabric crates.
//!
//! Each variant carries the failing operation's target so messages satisfy
//! the propagation policy: local recovery where possible, otherwise surface
//! with operation + cause.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry grant failed: {0}")]
    Grant(String),
    #[error("registry put failed for key {key}: {source}")]
    Put { key: String, source: String },
    #[error("registry get failed for key {key}: {source}")]
    Get { key: String, source: String },
    #[error("registry delete failed for key {key}: {source}")]
    Delete { key: String, source: String },
    #[error("registry watch failed for prefix {prefix}: {source}")]
    Watch { prefix: String, source: String },
    #[error("registry revoke failed for lease {lease_id}: {source}")]
    Revoke { lease_id: i64, source: String },
    #[error("get returned zero rows for key {0}")]
    NotFound(String),
    #[error("empty path passed to get")]
    EmptyPath,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("could not decode config value at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("config requires a non-empty {field}")]
    MissingField { field: &'static str },
    #[error("no tcp listen entry found for service {name}")]
    NoTcpListener { name: String },
}

#[derive(Debug, Error)]
pub enum DialError {
    #[error("failed to dial {uri}: {source}")]
    Connect { uri: String, source: String },
    #[error("invalid uri: {0}")]
    InvalidUri(String),
}

#[derive(Debug, Error)]
pub enum SelectionError {
    /// No `Connected` peer among the pool's addresses. Deliberately carries
    /// no name/address — the caller-visible name only appears at the router
    /// layer via [`NotFoundError`].
    #[error("no microservices found")]
    NoneFound,
    #[error("no microservices found(server_id): {server_id}")]
    NoneFoundForServerId { server_id: String },
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("rpc invoke failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("no microservices found: {0}")]
    Name(String),
    #[error("unknown registration key: {0}")]
    Key(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("write timeout out of range [500, 100000]ms: {0}")]
    WriteTimeoutOutOfRange(i64),
    #[error("unknown address: {0}")]
    UnknownAddress(String),
    #[error(transparent)]
    Dial(#[from] DialError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("microservice already registered: {0}")]
    DuplicateMicro(String),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}
