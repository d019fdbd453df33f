//! ManageSessionsUseCase: the table of live client sessions.
//!
//! The [`SessionTable`] is the single owner of every [`ClientSession`]. It is
//! keyed by listener port (at most one session per port) and indexed by
//! session id for lookups from event payloads.
//!
//! # Session lifecycle
//!
//! ```text
//! accept ──► install ──► (HELLO / LOG / GM_LIST applied) ──► removed
//!              │                                              ▲
//!              └── evicts the previous occupant of the port ──┘
//! ```
//!
//! Each installed entry carries a `serial` issued by the listener registry.
//! A reader task only mutates or removes its session while that serial is
//! still the one installed on the port, so a reader that is shutting down
//! after eviction can never touch its replacement.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use gm_core::{ClientSession, LogBuffer};
use tokio::sync::Mutex;

use crate::application::dispatch_commands::LineSink;

/// A session together with the handles needed to talk to it.
pub struct SessionEntry {
    pub session: ClientSession,
    /// Distinguishes this connection from any later one on the same port.
    pub serial: u64,
    pub sink: Arc<dyn LineSink>,
}

impl SessionEntry {
    pub fn new(session: ClientSession, serial: u64, sink: Arc<dyn LineSink>) -> Self {
        Self {
            session,
            serial,
            sink,
        }
    }
}

impl fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEntry")
            .field("session", &self.session)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// Live sessions keyed by listener port.
#[derive(Debug, Default)]
pub struct SessionTable {
    by_port: BTreeMap<u16, SessionEntry>,
    port_by_id: HashMap<String, u16>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `entry` on its port and returns the session it evicted.
    ///
    /// The caller must close the evicted session's sink.
    pub fn install(&mut self, entry: SessionEntry) -> Option<SessionEntry> {
        let port = entry.session.port;
        let evicted = self.remove_port(port);
        self.port_by_id.insert(entry.session.id.clone(), port);
        self.by_port.insert(port, entry);
        evicted
    }

    /// Removes whatever session is on `port`.
    pub fn remove_port(&mut self, port: u16) -> Option<SessionEntry> {
        let entry = self.by_port.remove(&port)?;
        // The same peer address may have been installed on another port since.
        if self.port_by_id.get(&entry.session.id) == Some(&port) {
            self.port_by_id.remove(&entry.session.id);
        }
        Some(entry)
    }

    /// Removes the session on `port` only if it is still the one with
    /// `serial`. Returns `None` when it was already replaced or removed.
    pub fn remove_if_current(&mut self, port: u16, serial: u64) -> Option<SessionEntry> {
        if self.is_current(port, serial) {
            self.remove_port(port)
        } else {
            None
        }
    }

    pub fn is_current(&self, port: u16, serial: u64) -> bool {
        self.by_port.get(&port).is_some_and(|e| e.serial == serial)
    }

    /// Mutable access to the session on `port` if `serial` is still current.
    pub fn current_mut(&mut self, port: u16, serial: u64) -> Option<&mut ClientSession> {
        self.by_port
            .get_mut(&port)
            .filter(|e| e.serial == serial)
            .map(|e| &mut e.session)
    }

    pub fn get(&self, port: u16) -> Option<&SessionEntry> {
        self.by_port.get(&port)
    }

    pub fn get_mut(&mut self, port: u16) -> Option<&mut SessionEntry> {
        self.by_port.get_mut(&port)
    }

    pub fn by_id(&self, session_id: &str) -> Option<&SessionEntry> {
        let port = self.port_by_id.get(session_id)?;
        self.by_port.get(port)
    }

    /// Entries in ascending port order.
    pub fn entries(&self) -> impl Iterator<Item = &SessionEntry> {
        self.by_port.values()
    }

    /// Snapshot of every session, in ascending port order.
    pub fn sessions(&self) -> Vec<ClientSession> {
        self.by_port.values().map(|e| e.session.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_port.is_empty()
    }
}

/// Everything the console mutates at runtime, guarded by one lock.
#[derive(Debug)]
pub struct ConsoleState {
    pub sessions: SessionTable,
    pub logs: LogBuffer,
}

impl ConsoleState {
    pub fn new(log_retention: usize) -> Self {
        Self {
            sessions: SessionTable::new(),
            logs: LogBuffer::with_capacity(log_retention),
        }
    }
}

/// State shared between the accept loops, readers, and dispatch engine.
///
/// A `tokio::sync::Mutex` because holders may `.await` while it is held
/// (never across a network write).
pub type SharedState = Arc<Mutex<ConsoleState>>;

pub fn shared_state(log_retention: usize) -> SharedState {
    Arc::new(Mutex::new(ConsoleState::new(log_retention)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch_commands::MockLineSink;

    fn entry(id: &str, port: u16, serial: u64) -> SessionEntry {
        SessionEntry::new(ClientSession::new(id, port), serial, Arc::new(MockLineSink::new()))
    }

    #[test]
    fn test_table_starts_empty() {
        let table = SessionTable::new();
        assert!(table.is_empty());
        assert!(table.get(12581).is_none());
    }

    #[test]
    fn test_install_evicts_previous_occupant_of_port() {
        // Arrange
        let mut table = SessionTable::new();
        table.install(entry("10.0.0.1:1000", 12581, 1));

        // Act
        let evicted = table.install(entry("10.0.0.2:2000", 12581, 2));

        // Assert
        assert_eq!(evicted.map(|e| e.session.id), Some("10.0.0.1:1000".to_string()));
        assert_eq!(table.len(), 1);
        assert!(table.by_id("10.0.0.1:1000").is_none());
        assert_eq!(table.by_id("10.0.0.2:2000").unwrap().session.port, 12581);
    }

    #[test]
    fn test_install_on_distinct_ports_keeps_both() {
        let mut table = SessionTable::new();
        assert!(table.install(entry("a:1", 1, 1)).is_none());
        assert!(table.install(entry("b:2", 2, 2)).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_same_peer_on_two_ports_stays_indexed_after_first_is_removed() {
        // Arrange
        let mut table = SessionTable::new();
        table.install(entry("10.0.0.1:5000", 1, 1));
        table.install(entry("10.0.0.1:5000", 2, 2));

        // Act
        table.remove_port(1);

        // Assert
        assert_eq!(table.len(), 1);
        assert_eq!(table.by_id("10.0.0.1:5000").unwrap().session.port, 2);
    }

    #[test]
    fn test_remove_if_current_ignores_stale_serial() {
        // Arrange
        let mut table = SessionTable::new();
        table.install(entry("old:1", 12581, 1));
        table.install(entry("new:2", 12581, 2));

        // Act
        let stale = table.remove_if_current(12581, 1);

        // Assert
        assert!(stale.is_none());
        assert_eq!(table.get(12581).unwrap().session.id, "new:2");
        assert!(table.remove_if_current(12581, 2).is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_if_current_twice_is_idempotent() {
        let mut table = SessionTable::new();
        table.install(entry("a:1", 1, 5));
        assert!(table.remove_if_current(1, 5).is_some());
        assert!(table.remove_if_current(1, 5).is_none());
    }

    #[test]
    fn test_current_mut_only_for_matching_serial() {
        let mut table = SessionTable::new();
        table.install(entry("a:1", 1, 5));

        assert!(table.current_mut(1, 4).is_none());
        table
            .current_mut(1, 5)
            .expect("current serial")
            .apply_hello("PixelPhone", "Android");
        assert_eq!(table.get(1).unwrap().session.device, "PixelPhone");
    }

    #[test]
    fn test_sessions_are_sorted_by_port() {
        let mut table = SessionTable::new();
        table.install(entry("c:3", 30, 1));
        table.install(entry("a:1", 10, 2));
        table.install(entry("b:2", 20, 3));

        let ports: Vec<u16> = table.sessions().iter().map(|s| s.port).collect();
        assert_eq!(ports, vec![10, 20, 30]);
    }

    #[test]
    fn test_console_state_uses_configured_log_retention() {
        let state = ConsoleState::new(3);
        assert_eq!(state.logs.capacity(), 3);
        assert!(state.sessions.is_empty());
    }
}
