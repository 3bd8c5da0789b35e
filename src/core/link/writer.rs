use crate::core::link::context::{LinkContext, StopToken};
use crate::core::link::transport::{write_line, WriteOutcome};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Writer half of the transport behind the write-exclusion lock. `None` once
/// the connection has been torn down.
pub type SharedWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// Sole owner of transport writes: drains the outbound queue one line at a
/// time until stopped.
pub struct WriterLoop {
    context: Arc<LinkContext>,
    writer: SharedWriter,
    stop: StopToken,
    poll_interval: Duration,
}

impl WriterLoop {
    pub fn new(context: Arc<LinkContext>, writer: SharedWriter, stop: StopToken, poll_interval: Duration) -> Self {
        Self {
            context,
            writer,
            stop,
            poll_interval,
        }
    }

    pub fn run(self) {
        let _guard = self.context.enter_thread();
        debug!("Writer loop started");

        while !self.stop.is_stopped() {
            let Some(line) = self.context.queue.pop_timeout(self.poll_interval) else {
                continue;
            };
            self.write(line);
        }

        // Teardown leaves the handle to a writer abandoned mid-write.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner).take();
        debug!("Writer loop stopped");
    }

    fn write(&self, line: String) {
        let outcome = {
            let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            match writer.as_mut() {
                Some(writer) => write_line(writer.as_mut(), &line),
                None => return,
            }
        };

        if self.stop.is_stopped() {
            // The connection was torn down while this write was blocked. The
            // queue may already belong to a newer connection.
            match outcome {
                WriteOutcome::Written => self.context.counters.record_sent(),
                WriteOutcome::TimedOut => self.context.counters.record_write_timeout(1),
                WriteOutcome::Failed(e) => debug!("Write failed after disconnect: {}", e),
            }
            return;
        }

        match outcome {
            WriteOutcome::Written => {
                self.context.counters.record_sent();
                let line = line.trim_end();
                debug!("TX {}", line);
                self.context.dispatcher.trace_tx(line);
            }
            WriteOutcome::TimedOut => {
                // Give up on the in-flight line and everything behind it so
                // the link can recover instead of backing up.
                let drained = self.context.queue.drain();
                self.context.counters.record_write_timeout(drained + 1);
                warn!(
                    "Write timed out; discarded in-flight message and {} pending message(s)",
                    drained
                );
            }
            WriteOutcome::Failed(e) => {
                error!("Failed to write to transport: {}", e);
            }
        }
    }
}
