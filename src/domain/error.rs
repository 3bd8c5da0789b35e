use thiserror::Error;

/// ThermoLink unified error type
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to open port '{port}': {message}")]
    PortOpen { port: String, message: String },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Outbound queue is full")]
    QueueFull,

    #[error("Output error: {0}")]
    Output(String),
}

pub type LinkResult<T> = Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_open_display() {
        let error = LinkError::PortOpen {
            port: "/dev/ttyACM0".to_string(),
            message: "No such file or directory".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("/dev/ttyACM0"));
        assert!(display.contains("No such file"));
    }

    #[test]
    fn test_io_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::TimedOut, "stalled");
        let error: LinkError = io_error.into();
        assert!(matches!(error, LinkError::Io(_)));
    }
}
