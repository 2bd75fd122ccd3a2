//! The RPC transport contract (C2): dial a peer, hold a long-lived
//! connection, observe its state, invoke against it.
//!
//! Dial once, keep the connection, observe its state, invoke/invoke-async
//! against it. Request/response/packet payloads are associated types so the
//! pool and router never inspect them.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DialError, InvokeError};

/// Connection health as observed by the transport, driving selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Closed,
}

/// A single live (or live-attempting) connection to one peer address.
#[async_trait]
pub trait RpcConnection: Send + Sync {
    type Request: Send;
    type Response: Send;
    type Packet: Send;

    /// Current observed state; selection treats anything but `Connected` as
    /// unhealthy.
    fn state(&self) -> ConnectionState;

    /// Sets the write deadline for subsequent `invoke`/`invoke_async` calls.
    /// Callers are responsible for clamping to `[500ms, 100s]`.
    fn set_write_timeout(&self, timeout: Duration);

    /// Sends `req` tagged with `cmd_id` and awaits a response.
    async fn invoke(
        &self,
        cmd_id: u64,
        req: Self::Request,
    ) -> Result<(Self::Packet, Self::Response), InvokeError>;

    /// Sends `req` tagged with `cmd_id` without waiting for a response.
    async fn invoke_async(&self, cmd_id: u64, req: Self::Request) -> Result<(), InvokeError>;

    /// Closes the connection. Idempotent.
    async fn close(&self);
}

/// Dials peer addresses, handing back a connection handle.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    type Connection: RpcConnection;

    /// Dials `uri` (already validated as a well-formed `tcp://`/`udp://` URI
    /// by the caller) with the given connect deadline.
    async fn dial(&self, uri: &str, timeout: Duration) -> Result<Self::Connection, DialError>;
}
