//! gm-console library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;

pub use application::dispatch_commands::{DispatchError, DispatchReport, Target};
pub use application::events::ConsoleEvent;
pub use infrastructure::network::ListenerError;
pub use infrastructure::ui_bridge::{Console, ConsoleSettings, OperatorReply};
