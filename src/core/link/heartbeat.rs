use crate::core::link::command::Command;
use crate::core::link::context::{LinkContext, StopToken};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace};

/// Enqueues a heartbeat command every `interval` through the ordinary
/// outbound path. A full queue drops the heartbeat like any other command.
pub struct HeartbeatLoop {
    context: Arc<LinkContext>,
    stop: StopToken,
    interval: Duration,
}

impl HeartbeatLoop {
    pub fn new(context: Arc<LinkContext>, stop: StopToken, interval: Duration) -> Self {
        Self {
            context,
            stop,
            interval,
        }
    }

    pub fn run(self) {
        let _guard = self.context.enter_thread();
        let line = match Command::heartbeat().to_line() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode heartbeat command: {}", e);
                return;
            }
        };
        debug!("Heartbeat loop started ({:?} interval)", self.interval);

        while !self.stop.sleep(self.interval) {
            if self.context.enqueue(line.clone()) {
                trace!("Heartbeat queued");
            }
        }

        debug!("Heartbeat loop stopped");
    }
}
