//! Parsing of operator shell input into [`OperatorCommand`]s.
//!
//! The grammar is one command word followed by arguments. `exec` and `find`
//! take the rest of the line verbatim; `gm` takes a node id and, optionally,
//! the rest of the line as its value.
//!
//! ```text
//! add 12581            exec print("hi")        gm god
//! remove 12581         target all              gm ammo true
//! target 12582         find teleport           gm speed 2.5
//! ```

use gm_core::ScalarValue;
use thiserror::Error;

use crate::application::dispatch_commands::Target;

/// Script that asks a client to re-send its command tree.
pub const RELOAD_TREE_SCRIPT: &str = "RuntimeGMClient.ReloadGM(true)";

pub const HELP_TEXT: &str = "\
commands:
  add <port>            start listening on <port> (0 = any free port)
  remove <port>         stop listening and drop the client on <port>
  ports                 list listeners and who is connected
  sessions              list connected clients
  status                port overview as JSON
  target <port|all>     choose where exec/gm/reload are sent
  exec <code>           send a raw script
  gm <node-id> [value]  invoke a command-tree node (true/false or text)
  reload                ask the target to re-send its command tree
  tree                  show the target's command tree
  find <text>           search the target's command tree by name
  logs [n]              show the last n client log lines (default 20)
  clear-logs            discard stored client log lines
  help                  show this text
  quit                  stop all listeners and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    AddListener(u16),
    RemoveListener(u16),
    Ports,
    Sessions,
    Status,
    SelectTarget(Target),
    Exec(String),
    Gm {
        node_id: String,
        value: Option<ScalarValue>,
    },
    ReloadTree,
    Tree,
    Find(String),
    Logs(Option<usize>),
    ClearLogs,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}; type `help`")]
    UnknownCommand(String),
    #[error("`{command}` needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("invalid count {0:?}")]
    InvalidCount(String),
}

/// Parses one line of operator input.
///
/// # Errors
///
/// Returns [`ParseCommandError`] for blank input, unknown words, and missing
/// or malformed arguments.
pub fn parse_command(line: &str) -> Result<OperatorCommand, ParseCommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "" => Err(ParseCommandError::Empty),
        "add" => Ok(OperatorCommand::AddListener(parse_port("add", rest)?)),
        "remove" | "rm" => Ok(OperatorCommand::RemoveListener(parse_port("remove", rest)?)),
        "ports" => Ok(OperatorCommand::Ports),
        "sessions" => Ok(OperatorCommand::Sessions),
        "status" => Ok(OperatorCommand::Status),
        "target" => Ok(OperatorCommand::SelectTarget(parse_target(rest)?)),
        "exec" => {
            let code = required("exec", "a script", rest)?;
            Ok(OperatorCommand::Exec(code.to_string()))
        }
        "gm" => {
            let args = required("gm", "a node id", rest)?;
            let (node_id, value) = match args.split_once(char::is_whitespace) {
                Some((id, value)) => (id, Some(parse_value(value.trim()))),
                None => (args, None),
            };
            Ok(OperatorCommand::Gm {
                node_id: node_id.to_string(),
                value,
            })
        }
        "reload" => Ok(OperatorCommand::ReloadTree),
        "tree" => Ok(OperatorCommand::Tree),
        "find" => {
            let text = required("find", "search text", rest)?;
            Ok(OperatorCommand::Find(text.to_string()))
        }
        "logs" => {
            if rest.is_empty() {
                return Ok(OperatorCommand::Logs(None));
            }
            rest.parse()
                .map(|n| OperatorCommand::Logs(Some(n)))
                .map_err(|_| ParseCommandError::InvalidCount(rest.to_string()))
        }
        "clear-logs" => Ok(OperatorCommand::ClearLogs),
        "help" | "?" => Ok(OperatorCommand::Help),
        "quit" | "exit" => Ok(OperatorCommand::Quit),
        other => Err(ParseCommandError::UnknownCommand(other.to_string())),
    }
}

/// `true`/`false` become booleans; anything else is kept as text.
pub fn parse_value(text: &str) -> ScalarValue {
    match text {
        "true" => ScalarValue::Bool(true),
        "false" => ScalarValue::Bool(false),
        other => ScalarValue::Text(other.to_string()),
    }
}

fn parse_target(text: &str) -> Result<Target, ParseCommandError> {
    if text.eq_ignore_ascii_case("all") {
        Ok(Target::All)
    } else {
        parse_port("target", text).map(Target::Port)
    }
}

fn parse_port(command: &'static str, text: &str) -> Result<u16, ParseCommandError> {
    let text = required(command, "a port", text)?;
    text.parse()
        .map_err(|_| ParseCommandError::InvalidPort(text.to_string()))
}

fn required<'a>(
    command: &'static str,
    argument: &'static str,
    text: &'a str,
) -> Result<&'a str, ParseCommandError> {
    if text.is_empty() {
        Err(ParseCommandError::MissingArgument { command, argument })
    } else {
        Ok(text)
    }
}
