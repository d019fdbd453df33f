//! Application layer use cases for the GM console.
//!
//! Code here orchestrates `gm_core` domain types and depends on the network
//! only through the [`dispatch_commands::LineSink`] trait, so every use case
//! can be exercised with in-memory test doubles.
//!
//! # Sub-modules
//!
//! - **`manage_sessions`** – the session table (one client per listener port)
//!   and the shared [`manage_sessions::ConsoleState`].
//! - **`handle_inbound`** – applies decoded `HELLO`/`LOG`/`GM_LIST` messages
//!   to a session and raises the matching event.
//! - **`dispatch_commands`** – targeted and broadcast delivery of `EXEC` and
//!   `EXEC_GM`.
//! - **`events`** – the typed event hub observers subscribe to.
//! - **`operator_command`** – parsing of operator shell input.

pub mod dispatch_commands;
pub mod events;
pub mod handle_inbound;
pub mod manage_sessions;
pub mod operator_command;
