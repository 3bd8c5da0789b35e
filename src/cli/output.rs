use crate::cli::args::OutputFormat;
use crate::core::link::{FailsafeNotice, LinkStats, Payload, PortDescriptor};
use crate::domain::config::ThermoLinkConfig;
use serde_json::{json, Value};
use std::io;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_ports(&self, ports: &[PortDescriptor]) -> Result<(), OutputError>;
    fn write_payload(&self, payload: &Payload) -> Result<(), OutputError>;
    fn write_failsafe(&self, notice: &FailsafeNotice) -> Result<(), OutputError>;
    fn write_trace(&self, direction: &str, line: &str) -> Result<(), OutputError>;
    fn write_stats(&self, stats: &LinkStats) -> Result<(), OutputError>;
    fn write_config(&self, config: &ThermoLinkConfig) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
}

impl From<OutputError> for crate::domain::error::LinkError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

#[derive(Tabled)]
struct PortRow {
    #[tabled(rename = "Port")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Counter")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: u64,
}

fn stat_rows(stats: &LinkStats) -> Vec<StatRow> {
    vec![
        StatRow { name: "lines sent", value: stats.lines_sent },
        StatRow { name: "lines received", value: stats.lines_received },
        StatRow { name: "decode failures", value: stats.decode_failures },
        StatRow { name: "queue rejections", value: stats.queue_rejections },
        StatRow { name: "write timeouts", value: stats.write_timeouts },
        StatRow { name: "messages discarded", value: stats.messages_discarded },
        StatRow { name: "watchdog trips", value: stats.watchdog_trips },
    ]
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_ports(&self, ports: &[PortDescriptor]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                if ports.is_empty() {
                    println!("No serial ports found");
                }
                for port in ports {
                    println!("{}  ({})", port.name, port.kind);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(ports)?);
            }
            OutputFormat::Table => {
                let rows: Vec<PortRow> = ports
                    .iter()
                    .map(|p| PortRow { name: p.name.clone(), kind: p.kind.clone() })
                    .collect();
                println!("{}", Table::new(rows));
            }
        }
        Ok(())
    }

    fn write_payload(&self, payload: &Payload) -> Result<(), OutputError> {
        // One compact object per line in every format so output stays streamable.
        println!("{}", serde_json::to_string(payload)?);
        Ok(())
    }

    fn write_failsafe(&self, notice: &FailsafeNotice) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let event = json!({
                    "failsafe": true,
                    "reason": notice.reason,
                    "silence_secs": notice.silence.as_secs_f64(),
                });
                eprintln!("{}", event);
            }
            _ => {
                eprintln!(
                    "FAILSAFE: {} ({:.1}s without data)",
                    notice.reason,
                    notice.silence.as_secs_f64()
                );
            }
        }
        Ok(())
    }

    fn write_trace(&self, direction: &str, line: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", json!({ "direction": direction, "line": line }));
            }
            _ => eprintln!("{} {}", direction, line),
        }
        Ok(())
    }

    fn write_stats(&self, stats: &LinkStats) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                for row in stat_rows(stats) {
                    println!("{:<20} {}", row.name, row.value);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(stats)?);
            }
            OutputFormat::Table => {
                println!("{}", Table::new(stat_rows(stats)));
            }
        }
        Ok(())
    }

    fn write_config(&self, config: &ThermoLinkConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            _ => print!("{}", toml::to_string_pretty(config)?),
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => println!("{}", json!({ "message": message })),
            _ => println!("{}", message),
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => eprintln!("{}", json!({ "error": error })),
            _ => eprintln!("Error: {}", error),
        }
        Ok(())
    }
}

/// Parse a CLI argument as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
