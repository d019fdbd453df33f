//! Domain entities for the GM console.
//!
//! Pure data and rules with no I/O: the command tree a client declares, the
//! cached state the console keeps per connected client, and the bounded log
//! buffer. Everything here can be unit-tested without a runtime or socket.

/// Client-declared command tree and the scalar values interactive nodes carry.
pub mod command_tree;

/// Append-only log entries with a retention cap.
pub mod log;

/// Cached identity and UI state of one connected client.
pub mod session;
