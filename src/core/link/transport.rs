use crate::domain::error::LinkResult;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Settings applied to every port the manager opens
#[derive(Debug, Clone, PartialEq)]
pub struct PortSettings {
    pub baud_rate: u32,
    /// Bound on a single read attempt
    pub read_timeout: Duration,
    /// Bound on a single write; None leaves the OS default in place
    pub write_timeout: Option<Duration>,
}

/// Port enumeration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    pub name: String,
    pub kind: String,
}

/// An open transport split into its two directions.
///
/// The reader half belongs to the reader thread alone. The writer half is
/// only touched by the writer thread under the write-exclusion lock.
pub struct Link {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

/// Opens transports by port name and enumerates candidates.
pub trait PortOpener: Send + Sync {
    fn open(&self, port: &str, settings: &PortSettings) -> LinkResult<Link>;

    fn available_ports(&self) -> LinkResult<Vec<PortDescriptor>>;
}

/// Result of one write attempt
#[derive(Debug)]
pub enum WriteOutcome {
    Written,
    TimedOut,
    Failed(io::Error),
}

/// Write and flush one line, classifying the failure instead of raising it.
pub fn write_line(writer: &mut dyn Write, line: &str) -> WriteOutcome {
    match writer.write_all(line.as_bytes()).and_then(|_| writer.flush()) {
        Ok(()) => WriteOutcome::Written,
        Err(e) if e.kind() == io::ErrorKind::TimedOut => WriteOutcome::TimedOut,
        Err(e) => WriteOutcome::Failed(e),
    }
}

/// Result of one read attempt
#[derive(Debug)]
pub enum ReadOutcome {
    Data(usize),
    Idle,
    Failed(io::Error),
}

/// Read once; timeouts and empty reads are `Idle`, not errors.
pub fn read_chunk(reader: &mut dyn Read, buffer: &mut [u8]) -> ReadOutcome {
    match reader.read(buffer) {
        Ok(0) => ReadOutcome::Idle,
        Ok(n) => ReadOutcome::Data(n),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            ReadOutcome::Idle
        }
        Err(e) => ReadOutcome::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    impl Write for Stalled {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "write stalled"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct TimingOut;

    impl Read for TimingOut {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "nothing yet"))
        }
    }

    #[test]
    fn test_write_line_success() {
        let mut sink: Vec<u8> = Vec::new();
        assert!(matches!(write_line(&mut sink, "{\"a\":1}\n"), WriteOutcome::Written));
        assert_eq!(sink, b"{\"a\":1}\n");
    }

    #[test]
    fn test_write_timeout_is_classified() {
        assert!(matches!(write_line(&mut Stalled, "x\n"), WriteOutcome::TimedOut));
    }

    #[test]
    fn test_read_timeout_is_idle() {
        let mut buffer = [0u8; 16];
        assert!(matches!(read_chunk(&mut TimingOut, &mut buffer), ReadOutcome::Idle));

        let mut source: &[u8] = b"abc";
        assert!(matches!(read_chunk(&mut source, &mut buffer), ReadOutcome::Data(3)));
        assert!(matches!(read_chunk(&mut source, &mut buffer), ReadOutcome::Idle));
    }
}
