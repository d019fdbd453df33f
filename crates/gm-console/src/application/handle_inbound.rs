//! HandleInboundUseCase: applies one decoded client message to console state.
//!
//! | message   | state change                         | event                  |
//! |-----------|--------------------------------------|------------------------|
//! | `HELLO`   | set device and platform              | `RegistryChanged`      |
//! | `LOG`     | append to the bounded log buffer     | `LogReceived(entry)`   |
//! | `GM_LIST` | replace the command tree wholesale   | `ClientDataChanged`    |
//!
//! Messages from a connection that is no longer installed on its port are
//! dropped, so an evicted client cannot write into its successor's state.

use gm_core::{InboundMessage, LogEntry};
use tracing::{debug, trace};

use crate::application::events::{ConsoleEvent, EventHub};
use crate::application::manage_sessions::SharedState;

/// Applies `msg` for the connection identified by `(port, serial)`.
///
/// Returns `false` if that connection is no longer current; the message is
/// discarded in that case and no event is emitted.
pub async fn apply_inbound(
    state: &SharedState,
    events: &EventHub,
    port: u16,
    serial: u64,
    msg: InboundMessage,
) -> bool {
    let event = {
        let mut guard = state.lock().await;
        let state = &mut *guard;
        let Some(session) = state.sessions.current_mut(port, serial) else {
            debug!(port, serial, kind = msg.type_name(), "message from stale connection dropped");
            return false;
        };

        match msg {
            InboundMessage::Hello { device, platform } => {
                debug!(session = %session.id, %device, %platform, "HELLO");
                session.apply_hello(device, platform);
                ConsoleEvent::RegistryChanged
            }
            InboundMessage::Log { level, message } => {
                trace!(session = %session.id, %level, "LOG");
                let entry = LogEntry::now(session.id.clone(), level, message);
                let dropped = state.logs.push(entry.clone());
                if dropped > 0 {
                    trace!(dropped, "log buffer trimmed");
                }
                ConsoleEvent::LogReceived(entry)
            }
            InboundMessage::GmList { nodes } => {
                debug!(session = %session.id, nodes = nodes.len(), "GM_LIST");
                session.replace_tree(nodes);
                ConsoleEvent::ClientDataChanged {
                    session_id: session.id.clone(),
                }
            }
        }
    };

    events.emit(event);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch_commands::MockLineSink;
    use crate::application::manage_sessions::{shared_state, SessionEntry};
    use gm_core::{ClientSession, CommandNode};
    use std::sync::Arc;

    const PORT: u16 = 12581;
    const SERIAL: u64 = 1;

    async fn state_with_session() -> SharedState {
        let state = shared_state(2);
        state.lock().await.sessions.install(SessionEntry::new(
            ClientSession::new("127.0.0.1:50000", PORT),
            SERIAL,
            Arc::new(MockLineSink::new()),
        ));
        state
    }

    fn button(id: &str) -> CommandNode {
        CommandNode::Button {
            id: id.to_string(),
            name: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_hello_updates_metadata_and_signals_registry_change() {
        // Arrange
        let state = state_with_session().await;
        let events = EventHub::default();
        let mut rx = events.subscribe();

        // Act
        let applied = apply_inbound(
            &state,
            &events,
            PORT,
            SERIAL,
            InboundMessage::Hello {
                device: "PixelPhone".to_string(),
                platform: "Android".to_string(),
            },
        )
        .await;

        // Assert
        assert!(applied);
        assert_eq!(rx.recv().await.unwrap(), ConsoleEvent::RegistryChanged);
        let guard = state.lock().await;
        let session = &guard.sessions.get(PORT).unwrap().session;
        assert_eq!(session.device, "PixelPhone");
        assert_eq!(session.platform, "Android");
    }

    #[tokio::test]
    async fn test_log_lines_are_bounded_and_announced() {
        // Arrange: retention of two
        let state = state_with_session().await;
        let events = EventHub::default();
        let mut rx = events.subscribe();

        // Act
        for text in ["one", "two", "three"] {
            apply_inbound(
                &state,
                &events,
                PORT,
                SERIAL,
                InboundMessage::Log {
                    level: "info".to_string(),
                    message: text.to_string(),
                },
            )
            .await;
        }

        // Assert
        let guard = state.lock().await;
        let kept: Vec<String> = guard.logs.recent(10).into_iter().map(|e| e.message).collect();
        assert_eq!(kept, vec!["two".to_string(), "three".to_string()]);
        match rx.recv().await.unwrap() {
            ConsoleEvent::LogReceived(entry) => {
                assert_eq!(entry.message, "one");
                assert_eq!(entry.source, "127.0.0.1:50000");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gm_list_replaces_tree_and_names_the_session() {
        let state = state_with_session().await;
        let events = EventHub::default();
        let mut rx = events.subscribe();

        for nodes in [vec![button("a"), button("b")], vec![button("c")]] {
            apply_inbound(&state, &events, PORT, SERIAL, InboundMessage::GmList { nodes }).await;
        }

        let guard = state.lock().await;
        assert_eq!(
            guard.sessions.get(PORT).unwrap().session.command_tree,
            Some(vec![button("c")])
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ConsoleEvent::ClientDataChanged {
                session_id: "127.0.0.1:50000".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_message_from_stale_connection_is_dropped() {
        let state = state_with_session().await;
        let events = EventHub::default();
        let mut rx = events.subscribe();

        let applied = apply_inbound(
            &state,
            &events,
            PORT,
            SERIAL + 1,
            InboundMessage::GmList { nodes: vec![button("x")] },
        )
        .await;

        assert!(!applied);
        assert!(rx.try_recv().is_err());
        assert!(!state.lock().await.sessions.get(PORT).unwrap().session.has_tree());
    }
}
