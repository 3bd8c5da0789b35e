//! In-memory transport for driving a `LinkManager` without hardware.
#![allow(dead_code)]

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thermolink::core::link::{Link, PortDescriptor, PortOpener, PortSettings};
use thermolink::{LinkConfig, LinkError, LinkResult};

/// How the fake device's receive side behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Accept every line immediately
    Accept,
    /// Block each write until released, then accept it
    Stall,
    /// Block each write until released, then time out
    StallThenTimeout,
}

/// Test-side handle to one opened port
pub struct FakeDevice {
    inbound: Sender<Vec<u8>>,
    pub written: Receiver<String>,
    pub write_started: Receiver<()>,
    pub read_started: Receiver<()>,
    release: Mutex<Option<Sender<()>>>,
    read_release: Mutex<Option<Sender<()>>>,
}

impl FakeDevice {
    /// Bytes the device "sends" to the host.
    pub fn emit(&self, bytes: &[u8]) {
        self.inbound.send(bytes.to_vec()).unwrap();
    }

    pub fn emit_line(&self, line: &str) {
        self.emit(format!("{}\n", line).as_bytes());
    }

    /// Next line written by the host, newline included.
    pub fn next_written(&self, timeout: Duration) -> Option<String> {
        self.written.recv_timeout(timeout).ok()
    }

    /// Let every stalled and future write proceed.
    pub fn release_writes(&self) {
        self.release.lock().unwrap().take();
    }

    /// Let every stalled and future read proceed.
    pub fn release_reads(&self) {
        self.read_release.lock().unwrap().take();
    }

    pub fn release_one(&self) {
        if let Some(release) = self.release.lock().unwrap().as_ref() {
            release.send(()).unwrap();
        }
    }
}

struct FakeReader {
    inbound: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    timeout: Duration,
    stall: bool,
    read_started: Sender<()>,
    release: Receiver<()>,
}

impl Read for FakeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.stall {
            let _ = self.read_started.send(());
            let _ = self.release.recv();
        }
        if self.pending.is_empty() {
            match self.inbound.recv_timeout(self.timeout) {
                Ok(bytes) => self.pending.extend(bytes),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    thread::sleep(self.timeout);
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "device gone"));
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

struct FakeWriter {
    mode: WriteMode,
    written: Sender<String>,
    write_started: Sender<()>,
    release: Receiver<()>,
    buffer: Vec<u8>,
}

impl Write for FakeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mode != WriteMode::Accept {
            let _ = self.write_started.send(());
            // Returns immediately once the release sender is dropped.
            let _ = self.release.recv();
            if self.mode == WriteMode::StallThenTimeout {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "write stalled"));
            }
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let line = String::from_utf8(std::mem::take(&mut self.buffer)).unwrap();
            let _ = self.written.send(line);
        }
        Ok(())
    }
}

/// Opener handing out fake ports; names starting with "missing" fail.
pub struct FakeOpener {
    mode: WriteMode,
    stall_reads: bool,
    devices: Mutex<Vec<Arc<FakeDevice>>>,
}

impl FakeOpener {
    pub fn new(mode: WriteMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            stall_reads: false,
            devices: Mutex::new(Vec::new()),
        })
    }

    /// Ports whose reads block until `release_reads`.
    pub fn stalling_reads(mode: WriteMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            stall_reads: true,
            devices: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> usize {
        self.devices.lock().unwrap().len()
    }

    pub fn device(&self) -> Arc<FakeDevice> {
        Arc::clone(self.devices.lock().unwrap().last().expect("no port opened"))
    }
}

impl PortOpener for FakeOpener {
    fn open(&self, port: &str, settings: &PortSettings) -> LinkResult<Link> {
        if port.starts_with("missing") {
            return Err(LinkError::PortOpen {
                port: port.to_string(),
                message: "No such file or directory".to_string(),
            });
        }

        let (inbound_tx, inbound_rx) = channel::unbounded();
        let (written_tx, written_rx) = channel::unbounded();
        let (started_tx, started_rx) = channel::unbounded();
        let (release_tx, release_rx) = channel::unbounded();
        let (read_started_tx, read_started_rx) = channel::unbounded();
        let (read_release_tx, read_release_rx) = channel::unbounded();

        self.devices.lock().unwrap().push(Arc::new(FakeDevice {
            inbound: inbound_tx,
            written: written_rx,
            write_started: started_rx,
            read_started: read_started_rx,
            release: Mutex::new(Some(release_tx)),
            read_release: Mutex::new(Some(read_release_tx)),
        }));

        Ok(Link {
            reader: Box::new(FakeReader {
                inbound: inbound_rx,
                pending: VecDeque::new(),
                timeout: settings.read_timeout,
                stall: self.stall_reads,
                read_started: read_started_tx,
                release: read_release_rx,
            }),
            writer: Box::new(FakeWriter {
                mode: self.mode,
                written: written_tx,
                write_started: started_tx,
                release: release_rx,
                buffer: Vec::new(),
            }),
        })
    }

    fn available_ports(&self) -> LinkResult<Vec<PortDescriptor>> {
        Ok(vec![PortDescriptor {
            name: "fake0".to_string(),
            kind: "Unknown".to_string(),
        }])
    }
}

/// Fast settings for tests: short read timeout, no heartbeat.
pub fn test_config() -> LinkConfig {
    LinkConfig {
        heartbeat_enabled: false,
        failsafe_timeout_secs: 30.0,
        read_timeout_ms: 20,
        join_timeout_ms: 1000,
        ..LinkConfig::default()
    }
}

pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
