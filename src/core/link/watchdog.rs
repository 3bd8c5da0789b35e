use crate::core::link::decoder::Payload;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Reason recorded when the watchdog itself trips
pub const WATCHDOG_REASON: &str = "pc_watchdog";
/// `event` value of the payload synthesized on a failsafe transition
pub const FAILSAFE_EVENT: &str = "failsafe_triggered";

#[derive(Debug, Clone)]
struct WatchdogState {
    last_data_time: Instant,
    failsafe_active: bool,
    failsafe_reason: Option<String>,
}

/// Emitted once per Safe -> Failsafe transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailsafeNotice {
    pub reason: String,
    /// Silence observed when the transition happened
    pub silence: Duration,
}

impl FailsafeNotice {
    /// Payload handed to subscribers when failsafe is entered.
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("event".to_string(), Value::String(FAILSAFE_EVENT.to_string()));
        payload.insert("failsafe_active".to_string(), Value::Bool(true));
        payload.insert("failsafe_reason".to_string(), Value::String(self.reason.clone()));
        payload
    }
}

/// Snapshot of the watchdog for callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailsafeStatus {
    pub active: bool,
    pub reason: Option<String>,
    pub since_last_data: Duration,
}

/// Liveness watchdog shared by the reader thread and the manager.
///
/// `failsafe_active` is only raised by [`Watchdog::check`] or
/// [`Watchdog::trigger`], and only lowered by [`Watchdog::clear`]. Every
/// method takes `now` explicitly so the state machine runs without real time.
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    state: Mutex<WatchdogState>,
}

impl Watchdog {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            state: Mutex::new(WatchdogState {
                last_data_time: now,
                failsafe_active: false,
                failsafe_reason: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WatchdogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start over for a fresh connection.
    pub fn reset(&self, now: Instant) {
        let mut state = self.lock();
        state.last_data_time = now;
        state.failsafe_active = false;
        state.failsafe_reason = None;
    }

    /// Record a successfully read line. Never moves `last_data_time` backwards.
    pub fn touch(&self, now: Instant) {
        let mut state = self.lock();
        if now > state.last_data_time {
            state.last_data_time = now;
        }
    }

    pub fn last_data_time(&self) -> Instant {
        self.lock().last_data_time
    }

    /// Trip into failsafe when the link has been silent for at least the
    /// timeout. Returns a notice only on the transition itself.
    pub fn check(&self, now: Instant) -> Option<FailsafeNotice> {
        let mut state = self.lock();
        if state.failsafe_active {
            return None;
        }
        let silence = now.saturating_duration_since(state.last_data_time);
        if silence < self.timeout {
            return None;
        }
        state.failsafe_active = true;
        state.failsafe_reason = Some(WATCHDOG_REASON.to_string());
        Some(FailsafeNotice {
            reason: WATCHDOG_REASON.to_string(),
            silence,
        })
    }

    /// Force failsafe for an external reason. Returns None if already active.
    pub fn trigger(&self, reason: &str, now: Instant) -> Option<FailsafeNotice> {
        let mut state = self.lock();
        if state.failsafe_active {
            return None;
        }
        state.failsafe_active = true;
        state.failsafe_reason = Some(reason.to_string());
        Some(FailsafeNotice {
            reason: reason.to_string(),
            silence: now.saturating_duration_since(state.last_data_time),
        })
    }

    /// Leave failsafe. Returns true if it was active.
    pub fn clear(&self) -> bool {
        let mut state = self.lock();
        let was_active = state.failsafe_active;
        state.failsafe_active = false;
        state.failsafe_reason = None;
        was_active
    }

    pub fn is_active(&self) -> bool {
        self.lock().failsafe_active
    }

    pub fn status(&self, now: Instant) -> FailsafeStatus {
        let state = self.lock();
        FailsafeStatus {
            active: state.failsafe_active,
            reason: state.failsafe_reason.clone(),
            since_last_data: now.saturating_duration_since(state.last_data_time),
        }
    }
}
