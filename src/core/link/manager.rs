use crate::core::link::command::Command;
use crate::core::link::context::{LinkContext, StopToken};
use crate::core::link::decoder::Payload;
use crate::core::link::dispatch::SubscriptionId;
use crate::core::link::heartbeat::HeartbeatLoop;
use crate::core::link::reader::ReaderLoop;
use crate::core::link::stats::LinkStats;
use crate::core::link::transport::{PortDescriptor, PortOpener, PortSettings};
use crate::core::link::watchdog::{FailsafeNotice, FailsafeStatus};
use crate::core::link::writer::{SharedWriter, WriterLoop};
use crate::domain::config::LinkConfig;
use crate::domain::error::LinkResult;
use crate::infrastructure::serial::SerialPortOpener;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Whether a transport is currently open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

struct Connection {
    port: String,
    stop: StopToken,
    writer: SharedWriter,
    threads: Vec<JoinHandle<()>>,
}

/// Serial link to a temperature controller.
///
/// Owns at most one open transport plus its reader, writer and heartbeat
/// threads. Every operation is callable from any thread and none of them
/// block on the device: `send` and friends only enqueue, and failures are
/// reported through return values, logs and dispatched events.
pub struct LinkManager {
    config: LinkConfig,
    opener: Arc<dyn PortOpener>,
    context: Arc<LinkContext>,
    connection: Mutex<Option<Connection>>,
}

impl LinkManager {
    /// Manager backed by real serial ports.
    pub fn new(config: LinkConfig) -> Self {
        Self::with_opener(config, Arc::new(SerialPortOpener))
    }

    pub fn with_opener(config: LinkConfig, opener: Arc<dyn PortOpener>) -> Self {
        let context = Arc::new(LinkContext::new(config.queue_capacity, config.failsafe_timeout()));
        Self {
            config,
            opener,
            context,
            connection: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open `port` and start the link threads. Failures are logged and
    /// reported as `false`.
    pub fn connect(&self, port: &str) -> bool {
        match self.try_connect(port) {
            Ok(()) => true,
            Err(e) => {
                error!("Connection to '{}' failed: {}", port, e);
                false
            }
        }
    }

    /// Like [`LinkManager::connect`] but returns the failure reason.
    pub fn try_connect(&self, port: &str) -> LinkResult<()> {
        self.config.validate()?;

        let mut slot = self.lock_connection();
        if let Some(previous) = slot.take() {
            info!("Replacing existing connection to '{}'", previous.port);
            self.teardown(previous);
        }

        let settings = PortSettings {
            baud_rate: self.config.baud_rate,
            read_timeout: self.config.read_timeout(),
            write_timeout: self.config.write_timeout(),
        };
        let link = self.opener.open(port, &settings)?;

        let discarded = self.context.queue.drain();
        if discarded > 0 {
            debug!("Discarded {} stale outbound message(s)", discarded);
        }
        self.context.watchdog.reset(Instant::now());
        self.context.dispatcher.reset_last_payload();

        let mut connection = Connection {
            port: port.to_string(),
            stop: StopToken::new(),
            writer: Arc::new(Mutex::new(Some(link.writer))),
            threads: Vec::with_capacity(3),
        };

        if let Err(e) = self.spawn_threads(&mut connection, link.reader) {
            self.teardown(connection);
            return Err(e.into());
        }

        info!("Connected to '{}' at {} baud", port, self.config.baud_rate);
        *slot = Some(connection);
        Ok(())
    }

    fn spawn_threads(&self, connection: &mut Connection, reader: Box<dyn std::io::Read + Send>) -> std::io::Result<()> {
        let poll = self.config.read_timeout();

        let reader_loop = ReaderLoop::new(Arc::clone(&self.context), reader, connection.stop.clone(), poll);
        connection.threads.push(
            thread::Builder::new()
                .name("thermolink-reader".to_string())
                .spawn(move || reader_loop.run())?,
        );

        let writer_loop = WriterLoop::new(
            Arc::clone(&self.context),
            Arc::clone(&connection.writer),
            connection.stop.clone(),
            poll,
        );
        connection.threads.push(
            thread::Builder::new()
                .name("thermolink-writer".to_string())
                .spawn(move || writer_loop.run())?,
        );

        if self.config.heartbeat_enabled {
            let heartbeat = HeartbeatLoop::new(
                Arc::clone(&self.context),
                connection.stop.clone(),
                self.config.heartbeat_interval(),
            );
            connection.threads.push(
                thread::Builder::new()
                    .name("thermolink-heartbeat".to_string())
                    .spawn(move || heartbeat.run())?,
            );
        }
        Ok(())
    }

    /// Stop the link threads and close the transport. No-op when already
    /// disconnected.
    pub fn disconnect(&self) {
        let connection = self.lock_connection().take();
        match connection {
            Some(connection) => {
                let port = connection.port.clone();
                self.teardown(connection);
                info!("Disconnected from '{}'", port);
            }
            None => debug!("Disconnect requested while not connected"),
        }
    }

    /// Alias of [`LinkManager::disconnect`].
    pub fn close(&self) {
        self.disconnect();
    }

    fn teardown(&self, connection: Connection) {
        connection.stop.stop();
        let timeout = self.config.join_timeout();
        let current = thread::current().id();

        for handle in connection.threads {
            let name = handle.thread().name().unwrap_or("link").to_string();
            if handle.thread().id() == current {
                // Called from a subscriber on this thread; it exits on its own.
                continue;
            }
            if !join_with_timeout(handle, timeout) {
                warn!("Thread '{}' did not stop within {:?}; abandoning it", name, timeout);
            }
        }

        // An abandoned writer still holds the lock mid-write; it drops the
        // handle itself once that write returns.
        match connection.writer.try_lock() {
            Ok(mut writer) => drop(writer.take()),
            Err(TryLockError::Poisoned(poisoned)) => drop(poisoned.into_inner().take()),
            Err(TryLockError::WouldBlock) => debug!("Writer busy; transport closes when its write returns"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock_connection().is_some()
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn port_name(&self) -> Option<String> {
        self.lock_connection().as_ref().map(|c| c.port.clone())
    }

    /// Names of the serial ports the opener can see. Enumeration failures
    /// are logged and yield an empty list.
    pub fn list_ports(&self) -> Vec<String> {
        match self.list_port_details() {
            Ok(ports) => ports.into_iter().map(|p| p.name).collect(),
            Err(e) => {
                error!("Failed to enumerate serial ports: {}", e);
                Vec::new()
            }
        }
    }

    pub fn list_port_details(&self) -> LinkResult<Vec<PortDescriptor>> {
        self.opener.available_ports()
    }

    /// Enqueue one raw line without blocking. Returns false when the
    /// outbound queue is full; a newline is appended if missing.
    pub fn send(&self, line: impl Into<String>) -> bool {
        self.context.enqueue(line.into())
    }

    pub fn send_command(&self, command: &Command) -> bool {
        match command.to_line() {
            Ok(line) => self.send(line),
            Err(e) => {
                error!("Failed to encode command {:?}: {}", command, e);
                false
            }
        }
    }

    /// `{"CMD": {"action": action, "state": state}}`
    pub fn send_cmd(&self, action: &str, state: impl Into<Value>) -> bool {
        self.send_command(&Command::cmd(action, state))
    }

    /// `{"SET": {"variable": variable, "value": value}}`
    pub fn send_set(&self, variable: &str, value: impl Into<Value>) -> bool {
        self.send_command(&Command::set(variable, value))
    }

    pub fn send_calibration(&self, sensor: &str, action: &str, actual: Option<f64>) -> bool {
        self.send_command(&Command::calibration(sensor, action, actual))
    }

    /// Ask the device to leave failsafe and clear the local flag right away,
    /// without waiting for an acknowledgement. The flag is left alone if the
    /// command could not be queued.
    pub fn clear_failsafe(&self) -> bool {
        if !self.send_command(&Command::clear_failsafe()) {
            warn!("Failsafe clear command dropped; local failsafe state unchanged");
            return false;
        }
        if self.context.watchdog.clear() {
            info!("Failsafe cleared locally");
        }
        true
    }

    /// Enter failsafe for a reason other than the watchdog. Returns false if
    /// failsafe was already active.
    pub fn trigger_failsafe(&self, reason: &str) -> bool {
        match self.context.watchdog.trigger(reason, Instant::now()) {
            Some(notice) => {
                self.context.announce_failsafe(&notice);
                true
            }
            None => false,
        }
    }

    pub fn is_failsafe_active(&self) -> bool {
        self.context.watchdog.is_active()
    }

    pub fn failsafe_status(&self) -> FailsafeStatus {
        self.context.watchdog.status(Instant::now())
    }

    pub fn last_data_time(&self) -> Instant {
        self.context.watchdog.last_data_time()
    }

    /// Most recent payload received from the device.
    pub fn read_data(&self) -> Option<Payload> {
        self.context.dispatcher.last_payload()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.context.dispatcher.subscribe(callback)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Payload>) {
        self.context.dispatcher.subscribe_channel()
    }

    pub fn on_rx_line<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.context.dispatcher.on_rx_line(callback)
    }

    pub fn on_tx_line<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.context.dispatcher.on_tx_line(callback)
    }

    pub fn on_failsafe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(FailsafeNotice) + Send + Sync + 'static,
    {
        self.context.dispatcher.on_failsafe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.context.dispatcher.unsubscribe(id)
    }

    /// Payload subscribers currently registered, channels included.
    pub fn subscriber_count(&self) -> usize {
        self.context.dispatcher.subscriber_count()
    }

    pub fn stats(&self) -> LinkStats {
        self.context.counters.snapshot()
    }

    pub fn pending_messages(&self) -> usize {
        self.context.queue.len()
    }

    /// Link threads currently alive, including abandoned ones that have not
    /// exited yet.
    pub fn active_threads(&self) -> usize {
        self.context.live_threads()
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        if self.is_connected() {
            self.disconnect();
        }
    }
}

/// Join `handle` if it finishes within `timeout`; otherwise leave it running.
fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
    if handle.join().is_err() {
        error!("Link thread panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::link::transport::Link;
    use crate::domain::error::LinkError;

    struct NoPorts;

    impl PortOpener for NoPorts {
        fn open(&self, port: &str, _settings: &PortSettings) -> LinkResult<Link> {
            Err(LinkError::PortOpen {
                port: port.to_string(),
                message: "no such device".to_string(),
            })
        }

        fn available_ports(&self) -> LinkResult<Vec<PortDescriptor>> {
            Ok(vec![PortDescriptor {
                name: "/dev/ttyTEST0".to_string(),
                kind: "Unknown".to_string(),
            }])
        }
    }

    fn manager() -> LinkManager {
        LinkManager::with_opener(LinkConfig::default(), Arc::new(NoPorts))
    }

    #[test]
    fn test_connect_failure_returns_false() {
        let manager = manager();
        assert!(!manager.connect("/dev/ttyMISSING"));
        assert!(!manager.is_connected());
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
        assert!(matches!(
            manager.try_connect("/dev/ttyMISSING"),
            Err(LinkError::PortOpen { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected_before_open() {
        let config = LinkConfig {
            queue_capacity: 0,
            ..LinkConfig::default()
        };
        let manager = LinkManager::with_opener(config, Arc::new(NoPorts));
        assert!(matches!(manager.try_connect("/dev/ttyX"), Err(LinkError::Config { .. })));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let manager = manager();
        manager.disconnect();
        manager.close();
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_list_ports() {
        assert_eq!(manager().list_ports(), vec!["/dev/ttyTEST0".to_string()]);
    }

    #[test]
    fn test_trigger_failsafe_once() {
        let manager = manager();
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        manager.on_failsafe(move |n| sink.lock().unwrap().push(n.reason));

        assert!(manager.trigger_failsafe("operator_stop"));
        assert!(!manager.trigger_failsafe("operator_stop"));
        assert!(manager.is_failsafe_active());
        assert_eq!(*notices.lock().unwrap(), vec!["operator_stop".to_string()]);
    }

    #[test]
    fn test_clear_failsafe_is_optimistic() {
        let manager = manager();
        manager.trigger_failsafe("operator_stop");
        assert!(manager.clear_failsafe());
        assert!(!manager.is_failsafe_active());
        assert_eq!(manager.pending_messages(), 1);
    }

    #[test]
    fn test_clear_failsafe_dropped_keeps_flag() {
        let manager = manager();
        for _ in 0..manager.config().queue_capacity {
            assert!(manager.send_cmd("noop", 0));
        }
        manager.trigger_failsafe("operator_stop");
        assert!(!manager.clear_failsafe());
        assert!(manager.is_failsafe_active());
    }
}
