use crate::core::link::context::{LinkContext, StopToken};
use crate::core::link::decoder::{decode_line, DecodeFailure, LineBuffer};
use crate::core::link::transport::{read_chunk, ReadOutcome};
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

const READ_BUFFER_SIZE: usize = 1024;

/// Sole owner of transport reads. Frames lines, decodes them, and evaluates
/// the watchdog once per iteration.
pub struct ReaderLoop {
    context: Arc<LinkContext>,
    reader: Box<dyn Read + Send>,
    stop: StopToken,
    failure_backoff: Duration,
    lines: LineBuffer,
}

impl ReaderLoop {
    /// `failure_backoff` paces the loop while the transport keeps failing;
    /// the watchdog keeps running during that time.
    pub fn new(context: Arc<LinkContext>, reader: Box<dyn Read + Send>, stop: StopToken, failure_backoff: Duration) -> Self {
        Self {
            context,
            reader,
            stop,
            failure_backoff,
            lines: LineBuffer::new(),
        }
    }

    pub fn run(mut self) {
        let _guard = self.context.enter_thread();
        debug!("Reader loop started");

        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let mut failing = false;

        while !self.stop.is_stopped() {
            let outcome = read_chunk(self.reader.as_mut(), &mut buffer);
            if self.stop.is_stopped() {
                // Torn down while blocked in the read; whatever arrived
                // belongs to a closed connection.
                break;
            }

            match outcome {
                ReadOutcome::Data(n) => {
                    failing = false;
                    for raw in self.lines.push(&buffer[..n]) {
                        self.handle_line(&raw);
                    }
                    let overflowed = self.lines.take_overflowed();
                    if overflowed > 0 {
                        self.handle_overflow(overflowed);
                    }
                }
                ReadOutcome::Idle => {}
                ReadOutcome::Failed(e) => {
                    if !failing {
                        error!("Failed to read from transport: {}", e);
                        failing = true;
                    }
                    self.stop.sleep(self.failure_backoff);
                }
            }

            self.evaluate_watchdog(Instant::now());
        }

        debug!("Reader loop stopped");
    }

    /// Process one complete line. Liveness is recorded before decoding, so
    /// malformed lines still count as traffic.
    pub fn handle_line(&self, raw: &[u8]) {
        let context = &self.context;
        context.watchdog.touch(Instant::now());
        context.counters.record_received();

        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        trace!("RX {}", text);
        context.dispatcher.trace_rx(text);

        match decode_line(raw) {
            Ok(payload) => {
                if context.watchdog.clear() {
                    info!("Failsafe cleared by inbound data");
                }
                context.dispatcher.dispatch_received(payload);
            }
            Err(DecodeFailure::Empty) => {}
            Err(failure) => {
                context.counters.record_decode_failure();
                warn!("Dropping inbound line ({}): {}", failure, text);
            }
        }
    }

    /// Oversized lines are still traffic from the device, but never decode.
    fn handle_overflow(&self, count: usize) {
        let context = &self.context;
        context.watchdog.touch(Instant::now());
        for _ in 0..count {
            context.counters.record_received();
            context.counters.record_decode_failure();
        }
        warn!(
            "Dropped {} inbound line(s) longer than {} bytes",
            count,
            self.lines.max_line()
        );
    }

    pub fn evaluate_watchdog(&self, now: Instant) {
        if let Some(notice) = self.context.watchdog.check(now) {
            self.context.counters.record_watchdog_trip();
            self.context.announce_failsafe(&notice);
        }
    }
}
