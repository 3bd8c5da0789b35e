use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Link counters shared by the manager and its threads.
#[derive(Debug, Default)]
pub struct LinkCounters {
    lines_sent: AtomicU64,
    lines_received: AtomicU64,
    decode_failures: AtomicU64,
    queue_rejections: AtomicU64,
    messages_discarded: AtomicU64,
    write_timeouts: AtomicU64,
    watchdog_trips: AtomicU64,
}

/// Point-in-time copy of [`LinkCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub lines_sent: u64,
    pub lines_received: u64,
    pub decode_failures: u64,
    pub queue_rejections: u64,
    /// In-flight plus pending messages dropped after write timeouts
    pub messages_discarded: u64,
    pub write_timeouts: u64,
    pub watchdog_trips: u64,
}

impl LinkCounters {
    pub fn record_sent(&self) {
        self.lines_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_rejection(&self) {
        self.queue_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_timeout(&self, discarded: usize) {
        self.write_timeouts.fetch_add(1, Ordering::Relaxed);
        self.messages_discarded.fetch_add(discarded as u64, Ordering::Relaxed);
    }

    pub fn record_watchdog_trip(&self) {
        self.watchdog_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkStats {
        LinkStats {
            lines_sent: self.lines_sent.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            queue_rejections: self.queue_rejections.load(Ordering::Relaxed),
            messages_discarded: self.messages_discarded.load(Ordering::Relaxed),
            write_timeouts: self.write_timeouts.load(Ordering::Relaxed),
            watchdog_trips: self.watchdog_trips.load(Ordering::Relaxed),
        }
    }
}
