use crate::core::link::dispatch::Dispatcher;
use crate::core::link::queue::OutboundQueue;
use crate::core::link::stats::LinkCounters;
use crate::core::link::watchdog::{FailsafeNotice, Watchdog};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error};

const STOP_POLL_STEP: Duration = Duration::from_millis(20);

/// State shared by the manager and every link thread. It outlives
/// individual connections; `LinkManager::connect` resets it.
pub struct LinkContext {
    pub queue: OutboundQueue,
    pub watchdog: Watchdog,
    pub dispatcher: Dispatcher,
    pub counters: LinkCounters,
    live_threads: AtomicUsize,
}

impl LinkContext {
    pub fn new(queue_capacity: usize, failsafe_timeout: Duration) -> Self {
        Self {
            queue: OutboundQueue::new(queue_capacity),
            watchdog: Watchdog::new(failsafe_timeout, Instant::now()),
            dispatcher: Dispatcher::new(),
            counters: LinkCounters::default(),
            live_threads: AtomicUsize::new(0),
        }
    }

    /// The single outbound path shared by callers and the heartbeat.
    pub fn enqueue(&self, mut line: String) -> bool {
        if !line.ends_with('\n') {
            line.push('\n');
        }
        if self.queue.push(line) {
            true
        } else {
            self.counters.record_queue_rejection();
            debug!("Outbound queue full ({}), message dropped", self.queue.capacity());
            false
        }
    }

    /// Announce a Safe -> Failsafe transition to hooks and subscribers.
    ///
    /// The synthetic payload goes through the non-clearing dispatch path.
    pub fn announce_failsafe(&self, notice: &FailsafeNotice) {
        error!(
            "Failsafe triggered ({}) after {:.1}s without inbound data",
            notice.reason,
            notice.silence.as_secs_f64()
        );
        self.dispatcher.notify_failsafe(notice);
        self.dispatcher.dispatch_synthetic(notice.to_payload());
    }

    /// Number of link threads currently running.
    pub fn live_threads(&self) -> usize {
        self.live_threads.load(Ordering::SeqCst)
    }

    /// Count the calling thread as live until the guard drops.
    pub fn enter_thread(self: &Arc<Self>) -> ThreadGuard {
        self.live_threads.fetch_add(1, Ordering::SeqCst);
        ThreadGuard {
            context: Arc::clone(self),
        }
    }
}

pub struct ThreadGuard {
    context: Arc<LinkContext>,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.context.live_threads.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cooperative cancellation flag for one connection's threads.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early once stopped. Returns true if stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(STOP_POLL_STEP.min(deadline - now));
        }
    }
}
