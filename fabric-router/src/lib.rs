//! Connection Pool (C7) and Microservice Router (C8).
//!
//! Depends only on `fabric-core`'s data model and trait contracts; knows
//! nothing about the registry or discovery — those are wired in by the
//! `fabric` crate's discovery→router binding helper.

pub mod pool;
pub mod router;

pub use pool::Pool;
pub use router::Router;
