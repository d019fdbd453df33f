//! DispatchCommandsUseCase: delivers operator commands to connected clients.
//!
//! A dispatch names a [`Target`], either the session on one listener port or
//! every live session, and one of two payloads:
//!
//! - a raw script, sent as `EXEC` with a fresh command id, or
//! - a command-tree node id with an optional value, sent as `EXEC_GM`.
//!
//! # Delivery semantics
//!
//! Delivery is best effort. A successful call means the line was handed to
//! the socket, not that the client ran it. The two target kinds differ in
//! how they treat failure:
//!
//! ```text
//! Target::Port(p)  no session on p   → Err(NoSuchTarget), nothing written
//!                  write fails       → Err(TransportWrite)
//! Target::All      zero sessions     → Ok, empty report
//!                  some writes fail  → Ok, failures listed in the report
//! ```
//!
//! # Optimistic UI state
//!
//! A targeted `EXEC_GM` that carries a value records it in the session's
//! `ui_state` *before* the write and never rolls it back, so the cache shows
//! what the operator last asked for. Broadcasts do not touch `ui_state`.
//!
//! The engine never holds the state lock across a network write: it resolves
//! recipients, clones their [`LineSink`] handles, releases the lock, and only
//! then writes.

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use gm_core::{
    encode_line, ClientSession, OutboundMessage, ProtocolError, ScalarValue, SequenceCounter,
};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::application::manage_sessions::SharedState;

// ── Transport seam ────────────────────────────────────────────────────────────

/// Write half of one client connection.
///
/// Infrastructure implements this over a TCP socket; tests substitute mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LineSink: Send + Sync {
    /// Writes one already-encoded, newline-terminated line.
    async fn send_line(&self, line: &str) -> io::Result<()>;

    /// Closes the connection abruptly. Idempotent.
    async fn close(&self);
}

// ── Request and result types ──────────────────────────────────────────────────

/// Who a dispatch is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// The session currently connected to this listener port.
    Port(u16),
    /// Every live session (broadcast).
    All,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Port(port) => write!(f, "port {port}"),
            Target::All => f.write_str("all"),
        }
    }
}

/// A session a line was written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub session_id: String,
    pub port: u16,
    pub device: String,
}

impl From<&ClientSession> for Recipient {
    fn from(session: &ClientSession) -> Self {
        Self {
            session_id: session.id.clone(),
            port: session.port,
            device: session.device.clone(),
        }
    }
}

/// A broadcast recipient whose write failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelivery {
    pub recipient: Recipient,
    pub error: String,
}

/// Outcome of one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub target: Target,
    /// `EXEC` or `EXEC_GM`.
    pub message_type: &'static str,
    /// The `EXEC` command id; `None` for `EXEC_GM`, which carries a node id.
    pub command_id: Option<u64>,
    /// Sessions the line was written to, ordered by port.
    pub delivered: Vec<Recipient>,
    /// Broadcast recipients whose write failed, ordered by port.
    pub failed: Vec<FailedDelivery>,
}

impl DispatchReport {
    /// One-line, operator-facing description of the outcome.
    pub fn summary(&self) -> String {
        let what = if self.message_type == gm_core::protocol::messages::message_type::EXEC_GM {
            "GM command"
        } else {
            "Script"
        };
        match self.target {
            Target::Port(_) => {
                let device = self
                    .delivered
                    .first()
                    .map(|r| r.device.as_str())
                    .unwrap_or(gm_core::domain::session::UNKNOWN);
                format!("{what} sent to {device}")
            }
            Target::All if self.failed.is_empty() => {
                format!("{what} broadcast to {} session(s)", self.delivered.len())
            }
            Target::All => format!(
                "{what} broadcast to {} session(s), {} failed",
                self.delivered.len(),
                self.failed.len()
            ),
        }
    }
}

/// Error type for the dispatch use case.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The targeted port has no connected session.
    #[error("no device on port {0}")]
    NoSuchTarget(u16),

    /// Writing to the targeted session failed.
    #[error("write to {session_id} failed: {source}")]
    TransportWrite {
        session_id: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Resolves targets against the shared session table and writes lines.
///
/// Cloning shares the state and the command id counter.
#[derive(Clone)]
pub struct DispatchEngine {
    state: SharedState,
    ids: Arc<SequenceCounter>,
}

impl DispatchEngine {
    pub fn new(state: SharedState) -> Self {
        Self::with_counter(state, Arc::new(SequenceCounter::default()))
    }

    pub fn with_counter(state: SharedState, ids: Arc<SequenceCounter>) -> Self {
        Self { state, ids }
    }

    /// Sends a raw script as `EXEC`.
    ///
    /// One command id is allocated per call; every recipient of a broadcast
    /// sees the same id.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoSuchTarget`] and [`DispatchError::TransportWrite`]
    /// for targeted sends only.
    pub async fn send_script(
        &self,
        target: Target,
        code: &str,
    ) -> Result<DispatchReport, DispatchError> {
        let id = self.ids.next();
        let msg = OutboundMessage::Exec {
            id,
            cmd: code.to_string(),
        };
        let mut report = self.dispatch(target, &msg, None).await?;
        report.command_id = Some(id);
        Ok(report)
    }

    /// Sends `EXEC_GM` for a command-tree node.
    ///
    /// `value` is `None` for buttons, a bool for toggles, and text for
    /// inputs. A targeted call with a value updates the session's `ui_state`
    /// before writing.
    ///
    /// # Errors
    ///
    /// Same as [`send_script`](Self::send_script).
    pub async fn send_command(
        &self,
        target: Target,
        node_id: &str,
        value: Option<ScalarValue>,
    ) -> Result<DispatchReport, DispatchError> {
        let remember = value.clone().map(|v| (node_id.to_string(), v));
        let msg = OutboundMessage::ExecGm {
            id: node_id.to_string(),
            value,
        };
        self.dispatch(target, &msg, remember).await
    }

    /// The id the next `EXEC` will carry.
    pub fn next_command_id(&self) -> u64 {
        self.ids.peek()
    }

    async fn dispatch(
        &self,
        target: Target,
        msg: &OutboundMessage,
        remember: Option<(String, ScalarValue)>,
    ) -> Result<DispatchReport, DispatchError> {
        let line = encode_line(msg)?;
        match target {
            Target::Port(port) => self.send_to_port(port, line, msg.type_name(), remember).await,
            Target::All => Ok(self.broadcast(line, msg.type_name()).await),
        }
    }

    async fn send_to_port(
        &self,
        port: u16,
        line: String,
        message_type: &'static str,
        remember: Option<(String, ScalarValue)>,
    ) -> Result<DispatchReport, DispatchError> {
        let (recipient, sink) = {
            let mut state = self.state.lock().await;
            let entry = state
                .sessions
                .get_mut(port)
                .ok_or(DispatchError::NoSuchTarget(port))?;
            if let Some((node_id, value)) = remember {
                entry.session.remember_value(node_id, value);
            }
            (Recipient::from(&entry.session), Arc::clone(&entry.sink))
        };

        if let Err(source) = sink.send_line(&line).await {
            warn!(session = %recipient.session_id, error = %source, "targeted write failed");
            return Err(DispatchError::TransportWrite {
                session_id: recipient.session_id,
                source,
            });
        }
        debug!(session = %recipient.session_id, message_type, "sent");

        Ok(DispatchReport {
            target: Target::Port(port),
            message_type,
            command_id: None,
            delivered: vec![recipient],
            failed: Vec::new(),
        })
    }

    async fn broadcast(&self, line: String, message_type: &'static str) -> DispatchReport {
        let snapshot: Vec<(Recipient, Arc<dyn LineSink>)> = {
            let state = self.state.lock().await;
            state
                .sessions
                .entries()
                .map(|entry| (Recipient::from(&entry.session), Arc::clone(&entry.sink)))
                .collect()
        };

        // Writes run concurrently so one stalled peer does not hold up the rest.
        let line = Arc::new(line);
        let mut writes = JoinSet::new();
        for (recipient, sink) in snapshot {
            let line = Arc::clone(&line);
            writes.spawn(async move {
                let result = sink.send_line(&line).await;
                (recipient, result)
            });
        }

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((recipient, Ok(()))) => delivered.push(recipient),
                Ok((recipient, Err(e))) => {
                    warn!(session = %recipient.session_id, error = %e, "broadcast write failed");
                    failed.push(FailedDelivery {
                        recipient,
                        error: e.to_string(),
                    });
                }
                Err(e) => warn!(error = %e, "broadcast write task did not complete"),
            }
        }
        delivered.sort_by_key(|r| r.port);
        failed.sort_by_key(|f| f.recipient.port);

        info!(
            message_type,
            delivered = delivered.len(),
            failed = failed.len(),
            "broadcast"
        );
        DispatchReport {
            target: Target::All,
            message_type,
            command_id: None,
            delivered,
            failed,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::manage_sessions::{shared_state, SessionEntry};
    use std::sync::Mutex;

    /// Records every line written; optionally fails every write.
    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LineSink for RecordingSink {
        async fn send_line(&self, line: &str) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }

        async fn close(&self) {}
    }

    async fn install(state: &SharedState, port: u16, device: &str, sink: Arc<dyn LineSink>) {
        let mut session = ClientSession::new(format!("127.0.0.1:{}", 40000 + port), port);
        session.apply_hello(device, "Test");
        state
            .lock()
            .await
            .sessions
            .install(SessionEntry::new(session, u64::from(port), sink));
    }

    #[tokio::test]
    async fn test_targeted_script_writes_exec_line_with_fresh_id() {
        // Arrange
        let state = shared_state(16);
        let sink = Arc::new(RecordingSink::default());
        install(&state, 12581, "PixelPhone", sink.clone()).await;
        let engine = DispatchEngine::new(state);

        // Act
        let report = engine
            .send_script(Target::Port(12581), "print(1)")
            .await
            .expect("targeted send must succeed");

        // Assert
        assert_eq!(report.command_id, Some(1000));
        assert_eq!(report.summary(), "Script sent to PixelPhone");
        assert_eq!(
            sink.lines(),
            vec!["{\"type\":\"EXEC\",\"id\":1000,\"cmd\":\"print(1)\"}\n".to_string()]
        );
    }

    #[tokio::test]
    async fn test_targeted_send_to_empty_port_fails_without_writing() {
        // Arrange
        let state = shared_state(16);
        let other = Arc::new(RecordingSink::default());
        install(&state, 12582, "Other", other.clone()).await;
        let engine = DispatchEngine::new(state.clone());

        // Act
        let result = engine
            .send_command(Target::Port(12581), "ammo", Some(ScalarValue::Bool(true)))
            .await;

        // Assert
        assert!(matches!(result, Err(DispatchError::NoSuchTarget(12581))));
        assert!(other.lines().is_empty());
        let guard = state.lock().await;
        assert!(guard.sessions.get(12582).unwrap().session.ui_state.is_empty());
    }

    #[tokio::test]
    async fn test_targeted_command_with_value_updates_ui_state_before_write() {
        // Arrange
        let state = shared_state(16);
        let sink = Arc::new(RecordingSink::default());
        install(&state, 12581, "PixelPhone", sink.clone()).await;
        let engine = DispatchEngine::new(state.clone());

        // Act
        let report = engine
            .send_command(Target::Port(12581), "ammo", Some(ScalarValue::Bool(true)))
            .await
            .unwrap();

        // Assert
        assert_eq!(report.command_id, None);
        assert_eq!(
            sink.lines(),
            vec!["{\"type\":\"EXEC_GM\",\"id\":\"ammo\",\"value\":true}\n".to_string()]
        );
        let guard = state.lock().await;
        let session = &guard.sessions.get(12581).unwrap().session;
        assert_eq!(session.ui_value("ammo"), Some(&ScalarValue::Bool(true)));
    }

    #[tokio::test]
    async fn test_failed_targeted_write_keeps_requested_value() {
        // Arrange
        let state = shared_state(16);
        install(&state, 12581, "PixelPhone", Arc::new(RecordingSink::failing())).await;
        let engine = DispatchEngine::new(state.clone());

        // Act
        let result = engine
            .send_command(Target::Port(12581), "speed", Some(ScalarValue::from("2")))
            .await;

        // Assert
        assert!(matches!(
            result,
            Err(DispatchError::TransportWrite { ref session_id, .. })
                if session_id == "127.0.0.1:52581"
        ));
        let guard = state.lock().await;
        let session = &guard.sessions.get(12581).unwrap().session;
        assert_eq!(session.ui_value("speed"), Some(&ScalarValue::from("2")));
    }

    #[tokio::test]
    async fn test_button_command_sends_null_value_and_leaves_ui_state() {
        let state = shared_state(16);
        let sink = Arc::new(RecordingSink::default());
        install(&state, 12581, "PixelPhone", sink.clone()).await;
        let engine = DispatchEngine::new(state.clone());

        engine
            .send_command(Target::Port(12581), "god", None)
            .await
            .unwrap();

        assert_eq!(
            sink.lines(),
            vec!["{\"type\":\"EXEC_GM\",\"id\":\"god\",\"value\":null}\n".to_string()]
        );
        assert!(state.lock().await.sessions.get(12581).unwrap().session.ui_state.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_with_no_sessions_succeeds() {
        let engine = DispatchEngine::new(shared_state(16));

        let report = engine.send_script(Target::All, "print(1)").await.unwrap();

        assert!(report.delivered.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(report.summary(), "Script broadcast to 0 session(s)");
    }

    #[tokio::test]
    async fn test_broadcast_tolerates_partial_failure() {
        // Arrange
        let state = shared_state(16);
        let a = Arc::new(RecordingSink::default());
        let c = Arc::new(RecordingSink::default());
        install(&state, 1, "A", a.clone()).await;
        install(&state, 2, "B", Arc::new(RecordingSink::failing())).await;
        install(&state, 3, "C", c.clone()).await;
        let engine = DispatchEngine::new(state);

        // Act
        let report = engine
            .send_script(Target::All, "x = 1")
            .await
            .expect("broadcast never fails on write errors");

        // Assert
        let delivered: Vec<&str> = report.delivered.iter().map(|r| r.device.as_str()).collect();
        assert_eq!(delivered, vec!["A", "C"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].recipient.device, "B");
        assert_eq!(a.lines().len(), 1);
        assert_eq!(c.lines().len(), 1);
        assert_eq!(report.summary(), "Script broadcast to 2 session(s), 1 failed");
    }

    #[tokio::test]
    async fn test_broadcast_recipients_share_one_command_id() {
        let state = shared_state(16);
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        install(&state, 1, "A", a.clone()).await;
        install(&state, 2, "B", b.clone()).await;
        let engine = DispatchEngine::new(state);

        let first = engine.send_script(Target::All, "one").await.unwrap();
        let second = engine.send_script(Target::All, "two").await.unwrap();

        assert_eq!(first.command_id, Some(1000));
        assert_eq!(second.command_id, Some(1001));
        assert_eq!(a.lines()[0], b.lines()[0]);
        assert!(a.lines()[1].contains("\"id\":1001"));
    }

    #[tokio::test]
    async fn test_broadcast_command_does_not_touch_ui_state() {
        let state = shared_state(16);
        install(&state, 1, "A", Arc::new(RecordingSink::default())).await;
        let engine = DispatchEngine::new(state.clone());

        let report = engine
            .send_command(Target::All, "ammo", Some(ScalarValue::Bool(false)))
            .await
            .unwrap();

        assert_eq!(report.summary(), "GM command broadcast to 1 session(s)");
        assert!(state.lock().await.sessions.get(1).unwrap().session.ui_state.is_empty());
    }

    #[tokio::test]
    async fn test_mocked_sink_receives_exactly_one_line() {
        // Arrange
        let mut sink = MockLineSink::new();
        sink.expect_send_line()
            .withf(|line: &str| line.starts_with("{\"type\":\"EXEC\"") && line.ends_with('\n'))
            .times(1)
            .returning(|_| Ok(()));
        let state = shared_state(16);
        install(&state, 7, "Mock", Arc::new(sink)).await;
        let ids = Arc::new(SequenceCounter::starting_at(42));
        let engine = DispatchEngine::with_counter(state, ids);

        // Act
        let report = engine.send_script(Target::Port(7), "noop()").await.unwrap();

        // Assert
        assert_eq!(report.command_id, Some(42));
        assert_eq!(engine.next_command_id(), 43);
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::Port(12581).to_string(), "port 12581");
        assert_eq!(Target::All.to_string(), "all");
    }
}
