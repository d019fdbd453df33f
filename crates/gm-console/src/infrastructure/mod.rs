//! Infrastructure layer for the console.
//!
//! Contains OS-facing adapters: TCP listeners and sockets, file-system config
//! storage, the [`ui_bridge::Console`] facade, and the terminal shell.
//!
//! **Dependency rule**: this layer may depend on `application` and `gm_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod shell;
pub mod storage;
pub mod ui_bridge;
