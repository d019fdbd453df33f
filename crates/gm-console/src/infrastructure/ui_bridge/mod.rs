//! Console facade: the single entry point a UI talks to.
//!
//! A [`Console`] owns the shared state, the event hub, the listener registry,
//! and the dispatch engine. A front end (the terminal shell in this crate, or
//! any dashboard) holds one `Console`, calls its async methods, and redraws
//! when a [`ConsoleEvent`] arrives on [`Console::subscribe`].
//!
//! # Data Transfer Objects (DTOs)
//!
//! Views handed to a UI (`PortStatus`, `SessionDto`) are plain serialisable
//! structs, so a front end can forward them as JSON without knowing
//! `gm_core` internals.
//!
//! # `OperatorReply`
//!
//! Every mutating call has a `Result` form for programmatic callers and an
//! [`OperatorReply`] conversion with the same shape for every command:
//! `{ success: bool, message: string }`. A front end can show the message as
//! a notification without matching on error types.

use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use gm_core::domain::command_tree::{count_nodes, find_node};
use gm_core::{search_tree, ClientSession, CommandNode, LogEntry, ScalarValue};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::application::dispatch_commands::{DispatchEngine, DispatchError, DispatchReport, Target};
use crate::application::events::{ConsoleEvent, EventHub};
use crate::application::manage_sessions::{shared_state, SharedState};
use crate::infrastructure::network::listener_registry::ListenerRegistry;
use crate::infrastructure::network::ListenerError;
use crate::infrastructure::storage::config::{ConfigError, ConsoleConfig};

// ── Settings ──────────────────────────────────────────────────────────────────

/// Runtime parameters of a [`Console`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSettings {
    pub bind_address: IpAddr,
    pub log_retention: usize,
    pub event_capacity: usize,
}

impl ConsoleSettings {
    /// # Errors
    ///
    /// [`ConfigError::InvalidBindAddress`] if the configured address does not
    /// parse.
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: config.network.bind_ip()?,
            log_retention: config.console.log_retention,
            event_capacity: config.console.event_capacity,
        })
    }
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        let config = ConsoleConfig::default();
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            log_retention: config.console.log_retention,
            event_capacity: config.console.event_capacity,
        }
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// One connected client, flattened for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDto {
    pub id: String,
    pub port: u16,
    pub device: String,
    pub platform: String,
    /// Nodes in the command tree, or `None` before the first `GM_LIST`.
    pub command_count: Option<usize>,
    pub connected_secs: u64,
}

impl From<&ClientSession> for SessionDto {
    fn from(s: &ClientSession) -> Self {
        Self {
            id: s.id.clone(),
            port: s.port,
            device: s.device.clone(),
            platform: s.platform.clone(),
            command_count: s.command_tree.as_deref().map(count_nodes),
            connected_secs: SystemTime::now()
                .duration_since(s.connected_at)
                .unwrap_or(Duration::ZERO)
                .as_secs(),
        }
    }
}

/// A listening port and whoever is connected to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortStatus {
    pub port: u16,
    /// `None` while waiting for a client.
    pub session: Option<SessionDto>,
}

/// What a UI should show in the command panel for one port.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandView {
    /// Nobody is connected on the port.
    NoSession,
    /// A client is connected but has not sent `GM_LIST` yet.
    AwaitingTree,
    /// The client's latest tree; may be empty.
    Tree(Vec<CommandNode>),
}

/// Uniform result shape for operator-facing calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorReply {
    pub success: bool,
    pub message: String,
}

impl OperatorReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<Result<DispatchReport, DispatchError>> for OperatorReply {
    fn from(result: Result<DispatchReport, DispatchError>) -> Self {
        match result {
            Ok(report) => Self::ok(report.summary()),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

impl From<Result<u16, ListenerError>> for OperatorReply {
    fn from(result: Result<u16, ListenerError>) -> Self {
        match result {
            Ok(port) => Self::ok(format!("Listening on port {port}")),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

// ── Console ───────────────────────────────────────────────────────────────────

pub struct Console {
    state: SharedState,
    events: EventHub,
    registry: ListenerRegistry,
    dispatch: DispatchEngine,
}

impl Console {
    pub fn new(settings: ConsoleSettings) -> Self {
        let state = shared_state(settings.log_retention);
        let events = EventHub::new(settings.event_capacity);
        let registry = ListenerRegistry::new(state.clone(), events.clone(), settings.bind_address);
        let dispatch = DispatchEngine::new(state.clone());
        Self {
            state,
            events,
            registry,
            dispatch,
        }
    }

    // ── Listeners ─────────────────────────────────────────────────────────────

    /// Starts listening on `port` (0 picks a free port) and returns the bound port.
    ///
    /// # Errors
    ///
    /// See [`ListenerRegistry::add_listener`].
    pub async fn add_listener(&self, port: u16) -> Result<u16, ListenerError> {
        self.registry.add_listener(port).await
    }

    /// Stops listening on `port`; a no-op returning `false` if it was not active.
    pub async fn remove_listener(&self, port: u16) -> bool {
        self.registry.remove_listener(port).await
    }

    pub async fn list_ports(&self) -> Vec<u16> {
        self.registry.list_ports().await
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    pub async fn session_for_port(&self, port: u16) -> Option<ClientSession> {
        let state = self.state.lock().await;
        state.sessions.get(port).map(|e| e.session.clone())
    }

    pub async fn session_by_id(&self, session_id: &str) -> Option<ClientSession> {
        let state = self.state.lock().await;
        state.sessions.by_id(session_id).map(|e| e.session.clone())
    }

    /// Every live session, ordered by port.
    pub async fn all_sessions(&self) -> Vec<ClientSession> {
        self.state.lock().await.sessions.sessions()
    }

    /// Each listening port with its connected client, if any.
    pub async fn port_overview(&self) -> Vec<PortStatus> {
        let ports = self.registry.list_ports().await;
        let state = self.state.lock().await;
        ports
            .into_iter()
            .map(|port| PortStatus {
                port,
                session: state.sessions.get(port).map(|e| SessionDto::from(&e.session)),
            })
            .collect()
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// See [`DispatchEngine::send_script`].
    pub async fn send_script(
        &self,
        target: Target,
        code: &str,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch.send_script(target, code).await
    }

    /// # Errors
    ///
    /// See [`DispatchEngine::send_command`].
    pub async fn send_command(
        &self,
        target: Target,
        node_id: &str,
        value: Option<ScalarValue>,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch.send_command(target, node_id, value).await
    }

    // ── Command tree ──────────────────────────────────────────────────────────

    pub async fn command_view(&self, port: u16) -> CommandView {
        let state = self.state.lock().await;
        match state.sessions.get(port) {
            None => CommandView::NoSession,
            Some(entry) => match &entry.session.command_tree {
                None => CommandView::AwaitingTree,
                Some(tree) => CommandView::Tree(tree.clone()),
            },
        }
    }

    /// Case-insensitive name search over the tree of the client on `port`.
    /// Empty when there is no session or no tree.
    pub async fn search_commands(&self, port: u16, query: &str) -> Vec<CommandNode> {
        let state = self.state.lock().await;
        state
            .sessions
            .get(port)
            .and_then(|e| e.session.command_tree.as_deref())
            .map(|tree| search_tree(tree, query).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Finds one node by id in the tree of the client on `port`.
    pub async fn command_node(&self, port: u16, node_id: &str) -> Option<CommandNode> {
        let state = self.state.lock().await;
        let tree = state.sessions.get(port)?.session.command_tree.as_deref()?;
        find_node(tree, node_id).cloned()
    }

    /// Last value requested for `node_id` on the client at `port`.
    pub async fn ui_value(&self, port: u16, node_id: &str) -> Option<ScalarValue> {
        let state = self.state.lock().await;
        state.sessions.get(port)?.session.ui_value(node_id).cloned()
    }

    // ── Logs and events ───────────────────────────────────────────────────────

    /// Up to `limit` most recent client log lines, oldest first.
    pub async fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        self.state.lock().await.logs.recent(limit)
    }

    pub async fn clear_logs(&self) {
        self.state.lock().await.logs.clear();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    /// Removes every listener and closes every session.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new(ConsoleSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch_commands::MockLineSink;
    use crate::application::manage_sessions::SessionEntry;
    use std::sync::Arc;

    fn local_console() -> Console {
        Console::new(ConsoleSettings {
            bind_address: IpAddr::from([127, 0, 0, 1]),
            ..ConsoleSettings::default()
        })
    }

    async fn install(console: &Console, port: u16, tree: Option<Vec<CommandNode>>) {
        let mut session = ClientSession::new(format!("127.0.0.1:{port}"), port);
        session.command_tree = tree;
        console.state.lock().await.sessions.install(SessionEntry::new(
            session,
            1,
            Arc::new(MockLineSink::new()),
        ));
    }

    fn toggle(id: &str, name: &str) -> CommandNode {
        CommandNode::Toggle {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_command_view_distinguishes_three_states() {
        // Arrange
        let console = local_console();
        install(&console, 1, None).await;
        install(&console, 2, Some(Vec::new())).await;

        // Act / Assert
        assert_eq!(console.command_view(9).await, CommandView::NoSession);
        assert_eq!(console.command_view(1).await, CommandView::AwaitingTree);
        assert_eq!(console.command_view(2).await, CommandView::Tree(Vec::new()));
    }

    #[tokio::test]
    async fn test_search_commands_uses_tree_of_port() {
        let console = local_console();
        install(&console, 1, Some(vec![toggle("ammo", "Infinite Ammo")])).await;

        let hits = console.search_commands(1, "AMMO").await;

        assert_eq!(hits, vec![toggle("ammo", "Infinite Ammo")]);
        assert!(console.search_commands(2, "ammo").await.is_empty());
        assert_eq!(
            console.command_node(1, "ammo").await,
            Some(toggle("ammo", "Infinite Ammo"))
        );
    }

    #[tokio::test]
    async fn test_send_to_missing_port_becomes_failed_reply() {
        let console = local_console();

        let reply: OperatorReply = console.send_script(Target::Port(12581), "x").await.into();

        assert_eq!(reply, OperatorReply::err("no device on port 12581"));
    }

    #[tokio::test]
    async fn test_port_overview_reports_waiting_ports() {
        // Arrange
        let console = local_console();
        let port = console.add_listener(0).await.unwrap();

        // Act
        let overview = console.port_overview().await;

        // Assert
        assert_eq!(overview, vec![PortStatus { port, session: None }]);
        console.shutdown().await;
        assert!(console.list_ports().await.is_empty());
    }

    #[tokio::test]
    async fn test_listener_reply_messages() {
        let console = local_console();
        let port = console.add_listener(0).await.unwrap();

        let dup: OperatorReply = console.add_listener(port).await.into();

        assert!(!dup.success);
        assert_eq!(dup.message, format!("port {port} is already active"));
        console.shutdown().await;
    }

    #[test]
    fn test_session_dto_counts_nested_nodes() {
        let mut session = ClientSession::new("127.0.0.1:1", 1);
        session.replace_tree(vec![CommandNode::Group {
            id: "g".to_string(),
            name: "G".to_string(),
            children: vec![toggle("a", "A")],
        }]);

        let dto = SessionDto::from(&session);

        assert_eq!(dto.command_count, Some(2));
        let json = serde_json::to_string(&dto).unwrap();
        assert!(json.contains("\"device\":\"Unknown\""));
    }
}
