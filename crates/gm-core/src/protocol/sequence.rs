//! Process-wide counter for outbound command ids.
//!
//! Every `EXEC` message carries an integer `id` that the client may log or use
//! to correlate its own output. The console never waits for a reply, so the
//! only requirement is that ids are unique and increasing for the lifetime of
//! the process, across all sessions.

use std::sync::atomic::{AtomicU64, Ordering};

/// First id handed out by [`SequenceCounter::default`].
pub const FIRST_COMMAND_ID: u64 = 1000;

/// A lock-free, monotonically increasing counter.
///
/// Shared by reference (or `Arc`) between tasks; [`next`](Self::next) never
/// returns the same value twice.
///
/// # Examples
///
/// ```rust
/// use gm_core::protocol::SequenceCounter;
///
/// let ids = SequenceCounter::default();
/// assert_eq!(ids.next(), 1000);
/// assert_eq!(ids.next(), 1001);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a counter whose first [`next`](Self::next) returns `start`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            inner: AtomicU64::new(start),
        }
    }

    /// Returns the next value. Wraps to 0 after `u64::MAX`.
    pub fn next(&self) -> u64 {
        // Only uniqueness matters; no other memory is synchronised through it.
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// The value the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::starting_at(FIRST_COMMAND_ID)
    }
}
