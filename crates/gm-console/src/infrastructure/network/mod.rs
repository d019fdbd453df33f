//! Network infrastructure for the console.
//!
//! # Sub-modules
//!
//! - **`listener_registry`** – binds and unbinds TCP listeners at runtime and
//!   runs one accept loop per port. A new connection evicts the previous
//!   client on the same port.
//!
//! - **`session_reader`** – the per-connection read loop that decodes lines
//!   and feeds them to the application layer.
//!
//! - **`tcp_sink`** – the [`LineSink`](crate::application::dispatch_commands::LineSink)
//!   implementation over a socket's write half, with a close signal shared
//!   with the reader.

pub mod listener_registry;
pub mod session_reader;
pub mod tcp_sink;

use std::net::SocketAddr;

use thiserror::Error;

/// What the operator is told when a listening socket stops accepting for good.
pub const PORT_UNAVAILABLE: &str = "port bind unavailable";

/// Error type for listener management.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// This console already listens on the port.
    #[error("port {0} is already active")]
    PortInUse(u16),

    /// The OS refused the bind (port held by another process, permissions).
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
