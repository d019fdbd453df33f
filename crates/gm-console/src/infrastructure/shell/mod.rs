//! Line-oriented operator shell over a [`Console`].
//!
//! The binary feeds stdin lines to [`Shell::handle_line`] and prints what
//! comes back. The shell remembers the current [`Target`] (broadcast until
//! the operator picks a port) so `exec`, `gm`, and `reload` need no address.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use gm_core::domain::command_tree::count_nodes;
use gm_core::{CommandNode, LogEntry, ScalarValue};

use crate::application::dispatch_commands::Target;
use crate::application::events::ConsoleEvent;
use crate::application::operator_command::{
    parse_command, OperatorCommand, HELP_TEXT, RELOAD_TREE_SCRIPT,
};
use crate::infrastructure::network::PORT_UNAVAILABLE;
use crate::infrastructure::ui_bridge::{CommandView, Console, OperatorReply, PortStatus};

/// Log lines shown by `logs` without a count.
const DEFAULT_LOG_LINES: usize = 20;

/// What the caller should do after a line was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellFlow {
    /// Print the text (if any) and keep reading.
    Continue(String),
    /// Stop reading; the caller shuts the console down.
    Quit,
}

pub struct Shell {
    console: Arc<Console>,
    target: Target,
}

impl Shell {
    pub fn new(console: Arc<Console>) -> Self {
        Self {
            console,
            target: Target::All,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Prompt text reflecting the current target.
    pub fn prompt(&self) -> String {
        match self.target {
            Target::All => "gm[all]> ".to_string(),
            Target::Port(port) => format!("gm[{port}]> "),
        }
    }

    pub async fn handle_line(&mut self, line: &str) -> ShellFlow {
        if line.trim().is_empty() {
            return ShellFlow::Continue(String::new());
        }
        match parse_command(line) {
            Ok(command) => self.execute(command).await,
            Err(e) => ShellFlow::Continue(render_reply(&OperatorReply::err(e.to_string()))),
        }
    }

    pub async fn execute(&mut self, command: OperatorCommand) -> ShellFlow {
        let text = match command {
            OperatorCommand::Quit => return ShellFlow::Quit,
            OperatorCommand::Help => HELP_TEXT.to_string(),
            OperatorCommand::AddListener(port) => {
                render_reply(&self.console.add_listener(port).await.into())
            }
            OperatorCommand::RemoveListener(port) => {
                let reply = if self.console.remove_listener(port).await {
                    OperatorReply::ok(format!("Stopped listening on port {port}"))
                } else {
                    OperatorReply::ok(format!("Port {port} was not listening"))
                };
                render_reply(&reply)
            }
            OperatorCommand::Ports => render_ports(&self.console.port_overview().await),
            OperatorCommand::Sessions => self.render_sessions().await,
            OperatorCommand::Status => {
                let overview = self.console.port_overview().await;
                match serde_json::to_string_pretty(&overview) {
                    Ok(json) => json,
                    Err(e) => render_reply(&OperatorReply::err(e.to_string())),
                }
            }
            OperatorCommand::SelectTarget(target) => {
                self.target = target;
                render_reply(&OperatorReply::ok(format!("Target: {target}")))
            }
            OperatorCommand::Exec(code) => {
                render_reply(&self.console.send_script(self.target, &code).await.into())
            }
            OperatorCommand::Gm { node_id, value } => render_reply(
                &self
                    .console
                    .send_command(self.target, &node_id, value)
                    .await
                    .into(),
            ),
            OperatorCommand::ReloadTree => render_reply(
                &self
                    .console
                    .send_script(self.target, RELOAD_TREE_SCRIPT)
                    .await
                    .into(),
            ),
            OperatorCommand::Tree => self.render_tree().await,
            OperatorCommand::Find(query) => self.render_search(&query).await,
            OperatorCommand::Logs(count) => {
                let entries = self.console.recent_logs(count.unwrap_or(DEFAULT_LOG_LINES)).await;
                if entries.is_empty() {
                    "no log lines".to_string()
                } else {
                    entries.iter().map(render_log).collect::<Vec<_>>().join("\n")
                }
            }
            OperatorCommand::ClearLogs => {
                self.console.clear_logs().await;
                render_reply(&OperatorReply::ok("Logs cleared"))
            }
        };
        ShellFlow::Continue(text)
    }

    async fn render_sessions(&self) -> String {
        let sessions = self.console.all_sessions().await;
        if sessions.is_empty() {
            return "no clients connected".to_string();
        }
        sessions
            .iter()
            .map(|s| {
                let tree = match &s.command_tree {
                    Some(tree) => format!("{} command(s)", count_nodes(tree)),
                    None => "no command tree yet".to_string(),
                };
                format!("{:>5}  {} ({})  {}  {}", s.port, s.device, s.platform, s.id, tree)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Resolves the current target to a port for tree views.
    fn target_port(&self) -> Result<u16, String> {
        match self.target {
            Target::Port(port) => Ok(port),
            Target::All => Err(render_reply(&OperatorReply::err(
                "select a port with `target <port>` first",
            ))),
        }
    }

    async fn render_tree(&self) -> String {
        let port = match self.target_port() {
            Ok(port) => port,
            Err(message) => return message,
        };
        match self.console.command_view(port).await {
            CommandView::NoSession => format!("no device on port {port}"),
            CommandView::AwaitingTree => {
                "waiting for the client to send its command tree".to_string()
            }
            CommandView::Tree(tree) if tree.is_empty() => {
                "the client declared no commands".to_string()
            }
            CommandView::Tree(tree) => {
                let values = self.ui_values(port).await;
                let mut out = String::new();
                write_tree(&mut out, &tree, &values, 0);
                out.trim_end().to_string()
            }
        }
    }

    async fn render_search(&self, query: &str) -> String {
        let port = match self.target_port() {
            Ok(port) => port,
            Err(message) => return message,
        };
        let hits = self.console.search_commands(port, query).await;
        if hits.is_empty() {
            return format!("no command matches {query:?}");
        }
        let values = self.ui_values(port).await;
        hits.iter()
            .map(|node| render_node(node, &values))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn ui_values(&self, port: u16) -> HashMap<String, ScalarValue> {
        self.console
            .session_for_port(port)
            .await
            .map(|s| s.ui_state)
            .unwrap_or_default()
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

pub fn render_reply(reply: &OperatorReply) -> String {
    let tag = if reply.success { "OK " } else { "ERR" };
    format!("{tag} {}", reply.message)
}

pub fn render_log(entry: &LogEntry) -> String {
    format!(
        "{} [{}] {}: {}",
        entry.clock_time(),
        entry.level,
        entry.source,
        entry.message
    )
}

/// Line printed for an asynchronous event, or `None` if it is not shown.
pub fn render_event(event: &ConsoleEvent) -> Option<String> {
    match event {
        ConsoleEvent::RegistryChanged => None,
        ConsoleEvent::LogReceived(entry) => Some(render_log(entry)),
        ConsoleEvent::ClientDataChanged { session_id } => {
            Some(format!("* command tree updated by {session_id}"))
        }
        ConsoleEvent::PortUnavailable { port } => {
            Some(format!("! port {port}: {PORT_UNAVAILABLE}"))
        }
    }
}

fn render_ports(overview: &[PortStatus]) -> String {
    if overview.is_empty() {
        return "no listeners".to_string();
    }
    overview
        .iter()
        .map(|status| match &status.session {
            Some(s) => format!("{:>5}  {} ({})  {}", status.port, s.device, s.platform, s.id),
            None => format!("{:>5}  waiting", status.port),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_node(node: &CommandNode, values: &HashMap<String, ScalarValue>) -> String {
    let mut line = format!("{} {} [{}]", node.kind_label(), node.name(), node.id());
    if let Some(value) = values.get(node.id()).filter(|_| node.is_interactive()) {
        let _ = write!(line, " = {value}");
    }
    line
}

fn write_tree(
    out: &mut String,
    nodes: &[CommandNode],
    values: &HashMap<String, ScalarValue>,
    depth: usize,
) {
    for node in nodes {
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), render_node(node, values));
        write_tree(out, node.children(), values, depth + 1);
    }
}
