//! Cached state of one connected client.
//!
//! A [`ClientSession`] is created the moment a socket is accepted and lives
//! until that socket closes or another connection takes over its port. The
//! console keeps the last metadata, command tree, and operator-requested
//! values here so a UI can be rebuilt at any time without asking the client.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::domain::command_tree::{CommandNode, ScalarValue};

/// Device/platform placeholder until the client sends `HELLO`.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSession {
    /// Remote peer address as `host:port`; unique among live sessions.
    pub id: String,
    /// Local listener port the client connected to.
    pub port: u16,
    pub device: String,
    pub platform: String,
    /// `None` until the first `GM_LIST`; `Some(vec![])` after an empty one.
    pub command_tree: Option<Vec<CommandNode>>,
    /// Last value the operator requested per interactive node id.
    ///
    /// Updated before the network write is attempted and never rolled back,
    /// so it reflects intent rather than confirmed client state.
    pub ui_state: HashMap<String, ScalarValue>,
    pub connected_at: SystemTime,
}

impl ClientSession {
    pub fn new(id: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            port,
            device: UNKNOWN.to_string(),
            platform: UNKNOWN.to_string(),
            command_tree: None,
            ui_state: HashMap::new(),
            connected_at: SystemTime::now(),
        }
    }

    pub fn apply_hello(&mut self, device: impl Into<String>, platform: impl Into<String>) {
        self.device = device.into();
        self.platform = platform.into();
    }

    /// Replaces the tree wholesale; nodes from the previous tree are not kept.
    pub fn replace_tree(&mut self, nodes: Vec<CommandNode>) {
        self.command_tree = Some(nodes);
    }

    pub fn remember_value(&mut self, node_id: impl Into<String>, value: ScalarValue) {
        self.ui_state.insert(node_id.into(), value);
    }

    pub fn ui_value(&self, node_id: &str) -> Option<&ScalarValue> {
        self.ui_state.get(node_id)
    }

    pub fn has_tree(&self) -> bool {
        self.command_tree.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button(id: &str) -> CommandNode {
        CommandNode::Button {
            id: id.to_string(),
            name: id.to_uppercase(),
        }
    }

    #[test]
    fn test_new_session_has_unknown_metadata_and_no_tree() {
        let session = ClientSession::new("10.0.0.7:50123", 12581);
        assert_eq!(session.device, "Unknown");
        assert_eq!(session.platform, "Unknown");
        assert!(!session.has_tree());
        assert!(session.ui_state.is_empty());
    }

    #[test]
    fn test_apply_hello_sets_metadata() {
        let mut session = ClientSession::new("10.0.0.7:50123", 12581);
        session.apply_hello("PixelPhone", "Android");
        assert_eq!(session.device, "PixelPhone");
        assert_eq!(session.platform, "Android");
    }

    #[test]
    fn test_replace_tree_does_not_merge_previous_nodes() {
        // Arrange
        let mut session = ClientSession::new("10.0.0.7:50123", 12581);
        session.replace_tree(vec![button("a"), button("b")]);

        // Act
        session.replace_tree(vec![button("c")]);

        // Assert
        assert_eq!(session.command_tree, Some(vec![button("c")]));
    }

    #[test]
    fn test_empty_tree_is_distinct_from_never_received() {
        let mut session = ClientSession::new("10.0.0.7:50123", 12581);
        session.replace_tree(Vec::new());
        assert!(session.has_tree());
        assert_eq!(session.command_tree.as_deref(), Some(&[][..]));
    }

    #[test]
    fn test_remember_value_overwrites_previous_value() {
        let mut session = ClientSession::new("10.0.0.7:50123", 12581);
        session.remember_value("ammo", ScalarValue::from(true));
        session.remember_value("ammo", ScalarValue::from(false));
        assert_eq!(session.ui_value("ammo"), Some(&ScalarValue::Bool(false)));
        assert_eq!(session.ui_value("other"), None);
    }
}
