//! Storage infrastructure: configuration file persistence.
//!
//! The console keeps no session history across restarts; the only thing on
//! disk is the TOML config read at startup (and written back with
//! `--write-config`).

pub mod config;
