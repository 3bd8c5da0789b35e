use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Command line arguments for ThermoLink
#[derive(Parser, Debug)]
#[command(
    name = "thermolink",
    version = env!("CARGO_PKG_VERSION"),
    about = "Serial link tool for JSON temperature controllers",
    long_about = "Connects to a temperature controller speaking newline-delimited JSON over a serial port, streams its telemetry, sends commands and reports watchdog failsafe events."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports
    Ports,
    /// Stream device telemetry until Ctrl-C
    Monitor(MonitorArgs),
    /// Send a single command to the device
    Send(SendArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Link overrides shared by commands that open a port
#[derive(ClapArgs, Debug, Clone)]
pub struct PortArgs {
    /// Serial port path
    #[arg(short, long)]
    pub port: String,

    /// Baud rate (overrides configuration)
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Failsafe timeout in seconds (overrides configuration)
    #[arg(long)]
    pub failsafe_timeout: Option<f64>,

    /// Write timeout in seconds (overrides configuration)
    #[arg(long)]
    pub write_timeout: Option<f64>,

    /// Do not send heartbeat commands
    #[arg(long)]
    pub no_heartbeat: bool,
}

/// Monitor arguments
#[derive(ClapArgs, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub link: PortArgs,

    /// Also print raw RX/TX lines
    #[arg(long)]
    pub raw: bool,
}

/// Send arguments
#[derive(ClapArgs, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: PortArgs,

    /// Milliseconds to wait for the writer to flush before disconnecting
    #[arg(long, default_value = "500")]
    pub linger_ms: u64,

    /// Command to send
    #[command(subcommand)]
    pub command: SendCommand,
}

/// Commands that can be sent to the device
#[derive(Subcommand, Debug)]
pub enum SendCommand {
    /// {"CMD": {"action": ACTION, "state": STATE}}
    Cmd {
        action: String,
        /// JSON value or bare string
        state: String,
    },
    /// {"SET": {"variable": VARIABLE, "value": VALUE}}
    Set {
        variable: String,
        /// JSON value or bare string
        value: String,
    },
    /// Calibration step for one sensor
    Calibrate {
        sensor: String,
        action: String,
        /// Reference reading for the step
        #[arg(long)]
        actual: Option<f64>,
    },
    /// Ask the device to leave failsafe
    ClearFailsafe,
    /// Send a raw line as-is
    Raw { line: String },
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Create a project configuration
    Init {
        /// Directory to create `.thermolink/config.toml` in
        path: Option<String>,
    },
}
