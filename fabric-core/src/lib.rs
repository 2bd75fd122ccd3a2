//! Data model, external trait contracts, bounded keyed cache, and error
//! taxonomy shared by the `fabric` and `fabric-router` crates.
//!
//! The registry (C1) and RPC transport (C2) live elsewhere in a real
//! deployment (an etcd-like store, a long-lived RPC connection) and are
//! modeled here purely as traits, implemented by nothing in this workspace.
//! Everything built on top of them — registration, discovery, pooling,
//! routing — lives in the sibling crates.

pub mod cache;
pub mod error;
pub mod model;
pub mod registry;
pub mod transport;

#[cfg(feature = "testkit")]
pub mod testkit;

pub use error::{
    ConfigError, DialError, InvokeError, NotFoundError, PoolError, RegistryError, RouterError,
    SelectionError,
};
pub use model::{
    get_tcp_url, uri_host, KeyValue, ListenSpec, MsConfig, PpmqcliConf, PublicConf,
    ServiceDescriptor, ValueDbconf, ValueLogConf, ValueWan, WatcherAction, WatcherEvent,
};
pub use registry::{Lease, RegistryClient};
pub use transport::{ConnectionState, RpcConnection, RpcTransport};
