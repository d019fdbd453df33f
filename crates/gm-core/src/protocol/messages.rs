//! Message types of the newline-delimited JSON protocol.
//!
//! Every message is one JSON object on one line with a `"type"` discriminant.
//! The two directions carry different message sets, so they are two enums:
//! a client can never be sent an inbound-only message by mistake.
//!
//! | direction        | type      | fields                         |
//! |------------------|-----------|--------------------------------|
//! | client → console | `HELLO`   | `device`, `platform`           |
//! | client → console | `LOG`     | `level`, `msg`                 |
//! | client → console | `GM_LIST` | `data` (command tree)          |
//! | console → client | `EXEC`    | `id` (int), `cmd` (script)     |
//! | console → client | `EXEC_GM` | `id` (node id), `value` / null |

use serde::{Deserialize, Serialize};

use crate::domain::command_tree::{CommandNode, ScalarValue};

/// Wire names of the `"type"` field.
pub mod message_type {
    pub const HELLO: &str = "HELLO";
    pub const LOG: &str = "LOG";
    pub const GM_LIST: &str = "GM_LIST";
    pub const EXEC: &str = "EXEC";
    pub const EXEC_GM: &str = "EXEC_GM";
}

/// Level used when a `LOG` message omits it.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Messages a client sends to the console.
///
/// Decoding is lenient (see [`crate::protocol::codec::decode_line`]), so this
/// enum is built by hand rather than derived.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Client identifies itself.
    Hello { device: String, platform: String },
    /// One log line; `msg` on the wire.
    Log { level: String, message: String },
    /// Full replacement of the client's command tree.
    GmList { nodes: Vec<CommandNode> },
}

impl InboundMessage {
    /// Wire name of this message, for log output.
    pub fn type_name(&self) -> &'static str {
        match self {
            InboundMessage::Hello { .. } => message_type::HELLO,
            InboundMessage::Log { .. } => message_type::LOG,
            InboundMessage::GmList { .. } => message_type::GM_LIST,
        }
    }
}

/// Messages the console sends to a client.
///
/// # Serde representation
///
/// ```json
/// {"type":"EXEC","id":1000,"cmd":"print(1)"}
/// {"type":"EXEC_GM","id":"god","value":null}
/// {"type":"EXEC_GM","id":"ammo","value":true}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Run a raw script. `id` is the process-wide command id, for client-side
    /// correlation only.
    #[serde(rename = "EXEC")]
    Exec { id: u64, cmd: String },

    /// Invoke a node from the client's command tree. `value` is always
    /// written, as `null` for plain buttons.
    #[serde(rename = "EXEC_GM")]
    ExecGm {
        id: String,
        #[serde(default)]
        value: Option<ScalarValue>,
    },
}

impl OutboundMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::Exec { .. } => message_type::EXEC,
            OutboundMessage::ExecGm { .. } => message_type::EXEC_GM,
        }
    }
}
