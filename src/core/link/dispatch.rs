use crate::core::link::decoder::Payload;
use crate::core::link::watchdog::FailsafeNotice;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{error, trace};

/// Handle returned by every `subscribe`/`on_*` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Ordered list of observers for one kind of event.
///
/// Each observer receives its own clone of the value. Callbacks run on the
/// thread that calls [`Observers::notify`] (the reader thread for inbound
/// events); a panicking callback is logged and does not stop delivery.
pub struct Observers<T> {
    name: &'static str,
    callbacks: RwLock<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T: Clone> Observers<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, id: SubscriptionId, callback: Callback<T>) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `value` to every observer registered at call time.
    pub fn notify(&self, value: &T) {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let snapshot: Vec<(SubscriptionId, Callback<T>)> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, callback) in snapshot {
            let copy = value.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| callback(copy))).is_err() {
                error!("{} observer {:?} panicked; continuing delivery", self.name, id);
            }
        }
    }
}

/// Fan-out point for everything the link reports upward.
pub struct Dispatcher {
    next_id: AtomicU64,
    payloads: Observers<Payload>,
    rx_lines: Observers<String>,
    tx_lines: Observers<String>,
    failsafe: Observers<FailsafeNotice>,
    last_payload: Mutex<Option<Payload>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            payloads: Observers::new("payload"),
            rx_lines: Observers::new("rx-line"),
            tx_lines: Observers::new("tx-line"),
            failsafe: Observers::new("failsafe"),
            last_payload: Mutex::new(None),
        }
    }

    fn allocate(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a payload observer. Runs on the reader thread.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.payloads.add(id, Arc::new(callback));
        id
    }

    /// Register a payload observer backed by a channel, so the consumer
    /// handles payloads on its own thread or task.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Payload>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.subscribe(move |payload| {
            // A dropped receiver only means the consumer stopped listening.
            let _ = sender.send(payload);
        });
        (id, receiver)
    }

    pub fn on_rx_line<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.rx_lines.add(id, Arc::new(callback));
        id
    }

    pub fn on_tx_line<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.tx_lines.add(id, Arc::new(callback));
        id
    }

    pub fn on_failsafe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(FailsafeNotice) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.failsafe.add(id, Arc::new(callback));
        id
    }

    /// Remove any observer registered under `id`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        // Ids are unique across lists, so at most one of these matches.
        self.payloads.remove(id)
            | self.rx_lines.remove(id)
            | self.tx_lines.remove(id)
            | self.failsafe.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.payloads.len()
    }

    /// Deliver a payload decoded from the device and remember it as the
    /// most recent one.
    pub fn dispatch_received(&self, payload: Payload) {
        *self.last_payload.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload.clone());
        self.payloads.notify(&payload);
    }

    /// Deliver a payload produced locally, e.g. a watchdog event.
    pub fn dispatch_synthetic(&self, payload: Payload) {
        trace!("Dispatching synthetic payload: {:?}", payload);
        self.payloads.notify(&payload);
    }

    pub fn last_payload(&self) -> Option<Payload> {
        self.last_payload.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn reset_last_payload(&self) {
        *self.last_payload.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn trace_rx(&self, line: &str) {
        if !self.rx_lines.is_empty() {
            self.rx_lines.notify(&line.to_string());
        }
    }

    pub fn trace_tx(&self, line: &str) {
        if !self.tx_lines.is_empty() {
            self.tx_lines.notify(&line.to_string());
        }
    }

    pub fn notify_failsafe(&self, notice: &FailsafeNotice) {
        self.failsafe.notify(notice);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_every_subscriber_gets_a_copy() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe(move |p| seen.lock().unwrap().push(p));
        }

        dispatcher.dispatch_received(payload(json!({"bean_temp": 200})));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|p| p["bean_temp"] == json!(200)));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = dispatcher.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch_received(payload(json!({"a": 1})));
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.dispatch_received(payload(json!({"a": 2})));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let dispatcher = Dispatcher::new();
        let delivered = Arc::new(AtomicU64::new(0));
        dispatcher.subscribe(|_| panic!("subscriber failure"));
        let counter = Arc::clone(&delivered);
        dispatcher.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch_received(payload(json!({"a": 1})));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_last_payload_ignores_synthetic() {
        let dispatcher = Dispatcher::new();
        assert!(dispatcher.last_payload().is_none());
        dispatcher.dispatch_received(payload(json!({"temp": 1})));
        dispatcher.dispatch_synthetic(payload(json!({"event": "failsafe_triggered"})));
        assert_eq!(dispatcher.last_payload().unwrap()["temp"], json!(1));
        dispatcher.reset_last_payload();
        assert!(dispatcher.last_payload().is_none());
    }

    #[test]
    fn test_channel_subscription() {
        let dispatcher = Dispatcher::new();
        let (_id, mut receiver) = dispatcher.subscribe_channel();
        dispatcher.dispatch_received(payload(json!({"x": true})));
        let received = receiver.try_recv().unwrap();
        assert_eq!(received["x"], json!(true));
    }

    #[test]
    fn test_trace_hooks() {
        let dispatcher = Dispatcher::new();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let rx = Arc::clone(&lines);
        let tx = Arc::clone(&lines);
        dispatcher.on_rx_line(move |l| rx.lock().unwrap().push(format!("rx:{}", l)));
        dispatcher.on_tx_line(move |l| tx.lock().unwrap().push(format!("tx:{}", l)));

        dispatcher.trace_rx("{\"a\":1}");
        dispatcher.trace_tx("{\"CMD\":{}}");
        assert_eq!(*lines.lock().unwrap(), vec!["rx:{\"a\":1}", "tx:{\"CMD\":{}}"]);
    }
}
