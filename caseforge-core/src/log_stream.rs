//! Append-only run log with replaying subscriptions
//!
//! Entries are numbered in append order and never mutated. A subscription
//! always starts from the first entry, so a viewer that joins late still
//! renders the full history, then follows new entries as they arrive.
//!
//! ```rust,ignore
//! let mut sub = stream.subscribe();
//! while let Some(entry) = sub.next().await {
//!     println!("{} {}", entry.level, entry.message);
//! }
//! ```

use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

use crate::types::{LogEntry, LogLevel};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StreamSignal {
    len: usize,
    closed: bool,
}

struct Shared {
    entries: RwLock<Vec<LogEntry>>,
    signal: watch::Sender<StreamSignal>,
}

/// Producer side of the run log.
#[derive(Clone)]
pub struct LogStream {
    shared: Arc<Shared>,
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStream {
    pub fn new() -> Self {
        let (signal, _initial) = watch::channel(StreamSignal::default());
        Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(Vec::new()),
                signal,
            }),
        }
    }

    /// Append an entry and wake subscribers.
    ///
    /// Timestamps are clamped so they never go backwards relative to the
    /// previous entry; ids are assigned here.
    pub fn append(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        case_number: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> LogEntry {
        let mut entries = self
            .shared
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let timestamp = match entries.last() {
            Some(last) if last.timestamp > timestamp => last.timestamp,
            _ => timestamp,
        };
        let entry = LogEntry {
            id: entries.len() as u64 + 1,
            timestamp,
            level,
            message: message.into(),
            case_number: case_number.map(str::to_string),
        };
        entries.push(entry.clone());
        let len = entries.len();
        drop(entries);

        self.shared.signal.send_modify(|s| s.len = len);
        entry
    }

    /// Mark the stream finished; subscriptions end once they reach the tail.
    pub fn close(&self) {
        self.shared.signal.send_modify(|s| s.closed = true);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.signal.borrow().closed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of every entry so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.read().clone()
    }

    /// Subscribe from the first entry.
    pub fn subscribe(&self) -> LogSubscription {
        LogSubscription {
            shared: Arc::clone(&self.shared),
            cursor: 0,
            changes: self.shared.signal.subscribe(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<LogEntry>> {
        self.shared
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Consumer side: replays history, then follows new entries.
pub struct LogSubscription {
    shared: Arc<Shared>,
    cursor: usize,
    changes: watch::Receiver<StreamSignal>,
}

impl LogSubscription {
    /// Next unread entry, if one is already available
    pub fn try_next(&mut self) -> Option<LogEntry> {
        let entries = self
            .shared
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(entry)
    }

    /// Every unread entry available right now
    pub fn drain(&mut self) -> Vec<LogEntry> {
        let entries = self
            .shared
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let unread = entries.get(self.cursor..).unwrap_or_default().to_vec();
        self.cursor = entries.len();
        unread
    }

    /// Wait for the next entry. Returns `None` once the stream is closed and
    /// fully read.
    pub async fn next(&mut self) -> Option<LogEntry> {
        loop {
            // Mark the current signal seen before reading, so an append that
            // lands in between still wakes the wait below.
            let signal = *self.changes.borrow_and_update();
            if let Some(entry) = self.try_next() {
                return Some(entry);
            }
            if signal.closed {
                return None;
            }
            if self.changes.changed().await.is_err() {
                return self.try_next();
            }
        }
    }

    /// Entries consumed so far
    pub fn position(&self) -> usize {
        self.cursor
    }
}
