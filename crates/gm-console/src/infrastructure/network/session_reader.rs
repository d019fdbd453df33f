//! Per-connection read loop.
//!
//! Reads `\n`-terminated lines, decodes each with
//! [`gm_core::decode_line`], and hands the result to
//! [`apply_inbound`]. A line that fails to decode, or is longer than
//! [`MAX_LINE_BYTES`], is logged and skipped; it never ends the session.
//! The loop ends on EOF, on a read error, or as soon as the session's sink
//! is closed locally.
//!
//! On exit the session is removed only if it is still the one installed on
//! its port, and `RegistryChanged` is raised only if something was removed.
//! That keeps exit idempotent when an eviction or listener removal already
//! took the session out of the table.

use std::io;

use gm_core::decode_line;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::events::{ConsoleEvent, EventHub};
use crate::application::handle_inbound::apply_inbound;
use crate::application::manage_sessions::SharedState;
use crate::infrastructure::network::tcp_sink::wait_closed;

/// Longest inbound line kept, newline included.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Identifies the connection a reader serves.
#[derive(Clone)]
pub struct ReaderContext {
    pub state: SharedState,
    pub events: EventHub,
    pub port: u16,
    pub serial: u64,
    pub session_id: String,
}

/// Why a read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The peer closed its side.
    Eof,
    /// Reading from the socket failed.
    ReadError,
    /// The session was closed locally (eviction or listener removal).
    ClosedLocally,
    /// The session was replaced before its message could be applied.
    Superseded,
}

/// Runs the read loop to completion and then cleans up the session.
pub async fn run_reader<R>(
    reader: R,
    ctx: ReaderContext,
    mut closed: watch::Receiver<bool>,
) -> ReaderExit
where
    R: AsyncRead + Unpin + Send,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(1024);

    let exit = loop {
        line.clear();
        let read = tokio::select! {
            read = read_bounded_line(&mut reader, &mut line, MAX_LINE_BYTES) => read,
            _ = wait_closed(&mut closed) => break ReaderExit::ClosedLocally,
        };

        match read {
            Ok(LineRead::Eof) => break ReaderExit::Eof,
            Ok(LineRead::TooLong) => {
                warn!(session = %ctx.session_id, limit = MAX_LINE_BYTES, "dropping over-long line");
            }
            Ok(LineRead::Line) => match decode_line(&line) {
                Ok(Some(msg)) => {
                    let applied =
                        apply_inbound(&ctx.state, &ctx.events, ctx.port, ctx.serial, msg).await;
                    if !applied {
                        break ReaderExit::Superseded;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(session = %ctx.session_id, error = %e, "dropping malformed line"),
            },
            Err(e) => {
                debug!(session = %ctx.session_id, error = %e, "read failed");
                break ReaderExit::ReadError;
            }
        }
    };

    finish(&ctx, exit).await;
    exit
}

async fn finish(ctx: &ReaderContext, exit: ReaderExit) {
    let removed = ctx
        .state
        .lock()
        .await
        .sessions
        .remove_if_current(ctx.port, ctx.serial);

    match removed {
        Some(entry) => {
            entry.sink.close().await;
            info!(session = %ctx.session_id, port = ctx.port, ?exit, "client disconnected");
            ctx.events.emit(ConsoleEvent::RegistryChanged);
        }
        None => debug!(
            session = %ctx.session_id,
            ?exit,
            "reader stopped after session was replaced"
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
    Line,
    TooLong,
    Eof,
}

/// Reads through the next `\n` into `buf`, keeping at most `max` bytes.
///
/// A longer line is still consumed up to its newline so the next read starts
/// on a fresh line, but nothing of it is kept. A final line without a newline
/// counts as a line.
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = false;
    let mut too_long = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (consumed, too_long) {
                (false, _) => LineRead::Eof,
                (true, true) => LineRead::TooLong,
                (true, false) => LineRead::Line,
            });
        }
        consumed = true;

        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        if !too_long {
            if buf.len() + used > max {
                too_long = true;
                buf.clear();
            } else {
                buf.extend_from_slice(&available[..used]);
            }
        }
        reader.consume(used);

        if done {
            return Ok(if too_long { LineRead::TooLong } else { LineRead::Line });
        }
    }
}
