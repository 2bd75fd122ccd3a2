//! Registration Agent (C4), Discovery Watcher (C5), Config Resolver (C6),
//! and the discovery→router wiring that closes the loop between them.
//!
//! Depends on `fabric-core` (data model, trait contracts) and `fabric-router`
//! (Connection Pool, Microservice Router).

pub mod agent;
pub mod config;
pub mod discovery;
pub mod wiring;

pub use agent::RegistrationAgent;
pub use config::ConfigResolver;
pub use discovery::{DiscoveryWatcher, WatcherCallback};
pub use wiring::bind_router;
