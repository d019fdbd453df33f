//! The command tree a game client pushes in `GM_LIST`.
//!
//! The console treats the tree as opaque: it stores it, renders it, searches
//! it by name, and echoes node ids back in `EXEC_GM`. It never interprets an
//! id. Real clients use the short type names `Btn` and `SubBox`; the long
//! forms `Button` and `Group` are accepted as aliases.
//!
//! ```text
//! SubBox "Player"
//!  ├─ Btn    "God Mode"      id=god
//!  ├─ Toggle "Infinite Ammo" id=ammo
//!  └─ SubBox "Teleport"
//!      └─ Input "Coordinates" id=tp
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A scalar carried by interactive nodes: a toggle state or an input's text.
///
/// Numbers are accepted so a client that sends numeric input values does not
/// lose them; the console itself only produces booleans and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Number(n) => write!(f, "{n}"),
            ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Bool(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

/// One entry of a client-declared command tree.
///
/// Only `Group` has children; the other variants are leaves. Trees may be
/// empty, flat, or arbitrarily nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CommandNode {
    #[serde(rename = "SubBox", alias = "Group")]
    Group {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        children: Vec<CommandNode>,
    },
    #[serde(rename = "Btn", alias = "Button")]
    Button {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
    },
    Toggle {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
    },
    Input {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
    },
}

impl CommandNode {
    /// Builds a node from an untyped JSON value, tolerating what clients send.
    ///
    /// Missing `id`/`name` become empty strings and numeric ids become their
    /// decimal text. Returns `None` for non-objects and unrecognised `type`
    /// values so one odd node does not discard its siblings.
    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;
        let kind = fields.get("type").and_then(Value::as_str)?;
        let id = token_field(fields.get("id"));
        let name = token_field(fields.get("name"));

        match kind {
            "SubBox" | "Group" => Some(CommandNode::Group {
                id,
                name,
                children: fields.get("children").map(parse_tree).unwrap_or_default(),
            }),
            "Btn" | "Button" => Some(CommandNode::Button { id, name }),
            "Toggle" => Some(CommandNode::Toggle { id, name }),
            "Input" => Some(CommandNode::Input { id, name }),
            other => {
                tracing::debug!(kind = other, id = %id, "skipping node of unrecognised type");
                None
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CommandNode::Group { id, .. }
            | CommandNode::Button { id, .. }
            | CommandNode::Toggle { id, .. }
            | CommandNode::Input { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CommandNode::Group { name, .. }
            | CommandNode::Button { name, .. }
            | CommandNode::Toggle { name, .. }
            | CommandNode::Input { name, .. } => name,
        }
    }

    /// Child nodes; empty for every variant except `Group`.
    pub fn children(&self) -> &[CommandNode] {
        match self {
            CommandNode::Group { children, .. } => children,
            _ => &[],
        }
    }

    /// Short label used by the operator shell.
    pub fn kind_label(&self) -> &'static str {
        match self {
            CommandNode::Group { .. } => "group",
            CommandNode::Button { .. } => "button",
            CommandNode::Toggle { .. } => "toggle",
            CommandNode::Input { .. } => "input",
        }
    }

    /// Toggles and inputs carry a value and have their last value cached.
    pub fn is_interactive(&self) -> bool {
        matches!(self, CommandNode::Toggle { .. } | CommandNode::Input { .. })
    }
}

/// Parses the `data` payload of a `GM_LIST` message.
///
/// Anything other than a JSON array (including `null`) yields an empty tree.
pub fn parse_tree(value: &Value) -> Vec<CommandNode> {
    match value {
        Value::Array(items) => items.iter().filter_map(CommandNode::from_value).collect(),
        _ => Vec::new(),
    }
}

/// Case-insensitive substring search over node names across the whole tree.
///
/// Results are in depth-first pre-order. A matching group is returned and its
/// children are still searched.
pub fn search_tree<'a>(nodes: &'a [CommandNode], query: &str) -> Vec<&'a CommandNode> {
    let needle = query.to_lowercase();
    let mut found = Vec::new();
    collect_matches(nodes, &needle, &mut found);
    found
}

fn collect_matches<'a>(nodes: &'a [CommandNode], needle: &str, found: &mut Vec<&'a CommandNode>) {
    for node in nodes {
        if node.name().to_lowercase().contains(needle) {
            found.push(node);
        }
        collect_matches(node.children(), needle, found);
    }
}

/// Finds the first node with the given id anywhere in the tree.
pub fn find_node<'a>(nodes: &'a [CommandNode], id: &str) -> Option<&'a CommandNode> {
    nodes.iter().find_map(|node| {
        if node.id() == id {
            Some(node)
        } else {
            find_node(node.children(), id)
        }
    })
}

/// Total number of nodes in the tree, groups included.
pub fn count_nodes(nodes: &[CommandNode]) -> usize {
    nodes.iter().map(|n| 1 + count_nodes(n.children())).sum()
}

fn token_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
