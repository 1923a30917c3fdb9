//! Shared health buffer
//!
//! A bounded, mutex-guarded FIFO used by handlers to pass warnings to later
//! dispatch cycles. Both operations are single critical sections, so a
//! handler cancelled mid-flight can never leave a half-applied append behind.
//!
//! Visibility lag: handlers of one cycle run concurrently, so an entry
//! appended by one handler in cycle N is only guaranteed to be seen by a
//! flushing handler in cycle N+1 or later. This lag is accepted; the emitter
//! simply reports it one cycle later.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::HEALTH_BUFFER_CAPACITY;

/// One buffered warning line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEntry {
    /// Arrival time
    pub at: DateTime<Utc>,
    /// Warning text (single line)
    pub message: String,
}

impl fmt::Display for BufferEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.message
        )
    }
}

/// Service interface for the shared buffer, injected into the dispatcher
/// and handed to handlers through the hook context.
#[cfg_attr(test, mockall::automock)]
pub trait HealthBuffer: Send + Sync {
    /// Append one message. Empty messages are ignored; at capacity the
    /// oldest entry is evicted first.
    fn append(&self, message: &str);

    /// Atomically take every buffered entry in arrival order.
    fn flush(&self) -> Vec<BufferEntry>;

    /// Number of entries currently buffered.
    fn len(&self) -> usize;

    /// Whether the buffer is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory ring buffer implementation of [`HealthBuffer`].
#[derive(Debug)]
pub struct RingBuffer {
    entries: Mutex<VecDeque<BufferEntry>>,
    capacity: usize,
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave the deque half-updated
    // (push/pop are whole operations), so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<BufferEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(HEALTH_BUFFER_CAPACITY)
    }
}

impl HealthBuffer for RingBuffer {
    fn append(&self, message: &str) {
        // Entries are line-oriented; embedded newlines would split one
        // warning into several on render.
        let message = message.trim().replace('\n', " ");
        if message.is_empty() {
            return;
        }

        let entry = BufferEntry {
            at: Utc::now(),
            message,
        };

        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    fn flush(&self) -> Vec<BufferEntry> {
        let mut entries = self.lock();
        if entries.is_empty() {
            return Vec::new();
        }
        entries.drain(..).collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
