//! # gm-core
//!
//! Shared library for the GM console containing the newline-delimited JSON
//! wire codec, the client-declared command tree, and the per-client session
//! and log types.
//!
//! This crate has no dependency on sockets, async runtimes, or UI code; the
//! console crate (`gm-console`) builds the listener registry and dispatch
//! engine on top of it.
//!
//! # Architecture overview
//!
//! A game client connects to one of the operator's TCP listeners and talks in
//! single-line JSON objects:
//!
//! ```text
//! client  →  console   {"type":"HELLO","device":"PixelPhone","platform":"Android"}
//! client  →  console   {"type":"LOG","level":"warn","msg":"low memory"}
//! client  →  console   {"type":"GM_LIST","data":[{"type":"Btn","id":"god","name":"God Mode"}]}
//! console →  client    {"type":"EXEC","id":1000,"cmd":"print(1)"}
//! console →  client    {"type":"EXEC_GM","id":"god","value":null}
//! ```
//!
//! - **`protocol`** – message enums, the line codec, and the process-wide
//!   command id counter.
//! - **`domain`** – the command tree, the cached state of one client session,
//!   and the bounded log buffer.

pub mod domain;
pub mod protocol;

pub use domain::command_tree::{search_tree, CommandNode, ScalarValue};
pub use domain::log::{LogBuffer, LogEntry};
pub use domain::session::ClientSession;
pub use protocol::codec::{decode_line, encode_line, ProtocolError};
pub use protocol::messages::{InboundMessage, OutboundMessage};
pub use protocol::sequence::SequenceCounter;
