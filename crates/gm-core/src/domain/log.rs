//! Log lines emitted by clients via `LOG` messages.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default number of entries kept before the oldest are discarded.
pub const DEFAULT_LOG_RETENTION: usize = 1000;

/// One client log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    /// Session id (`host:port`) of the client that sent the line.
    pub source: String,
    pub level: String,
    pub message: String,
}

impl LogEntry {
    /// Creates an entry stamped with the current wall-clock time.
    pub fn now(
        source: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source: source.into(),
            level: level.into(),
            message: message.into(),
        }
    }

    /// `HH:MM:SS` (UTC) of the timestamp, for compact terminal output.
    pub fn clock_time(&self) -> String {
        let secs = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            % 86_400;
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    }
}

/// Bounded, append-only log store; the oldest entries are dropped first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    /// A capacity of zero is raised to one so the latest line is always visible.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_RETENTION)),
            capacity,
        }
    }

    /// Appends an entry and returns how many old entries were discarded.
    pub fn push(&mut self, entry: LogEntry) -> usize {
        let mut dropped = 0;
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            dropped += 1;
        }
        self.entries.push_back(entry);
        dropped
    }

    /// The newest `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(msg: &str) -> LogEntry {
        LogEntry::now("127.0.0.1:5000", "info", msg)
    }

    #[test]
    fn test_push_keeps_entries_in_arrival_order() {
        let mut logs = LogBuffer::with_capacity(10);
        logs.push(entry("a"));
        logs.push(entry("b"));

        let recent: Vec<String> = logs.recent(10).into_iter().map(|e| e.message).collect();
        assert_eq!(recent, vec!["a", "b"]);
    }

    #[test]
    fn test_push_beyond_capacity_discards_oldest() {
        // Arrange
        let mut logs = LogBuffer::with_capacity(3);
        for msg in ["1", "2", "3"] {
            assert_eq!(logs.push(entry(msg)), 0);
        }

        // Act
        let dropped = logs.push(entry("4"));

        // Assert
        assert_eq!(dropped, 1);
        assert_eq!(logs.len(), 3);
        let recent: Vec<String> = logs.recent(3).into_iter().map(|e| e.message).collect();
        assert_eq!(recent, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_recent_limits_to_newest_entries() {
        let mut logs = LogBuffer::default();
        for i in 0..20 {
            logs.push(entry(&i.to_string()));
        }
        let recent: Vec<String> = logs.recent(2).into_iter().map(|e| e.message).collect();
        assert_eq!(recent, vec!["18", "19"]);
    }

    #[test]
    fn test_zero_capacity_still_keeps_latest_entry() {
        let mut logs = LogBuffer::with_capacity(0);
        logs.push(entry("first"));
        logs.push(entry("second"));
        assert_eq!(logs.capacity(), 1);
        assert_eq!(logs.recent(5)[0].message, "second");
    }

    #[test]
    fn test_clear_empties_buffer() {
        let mut logs = LogBuffer::default();
        logs.push(entry("x"));
        logs.clear();
        assert!(logs.is_empty());
    }

    #[test]
    fn test_clock_time_formats_utc_time_of_day() {
        let mut e = entry("t");
        e.timestamp = UNIX_EPOCH + Duration::from_secs(86_400 * 3 + 3600 * 13 + 60 * 5 + 9);
        assert_eq!(e.clock_time(), "13:05:09");
    }
}
