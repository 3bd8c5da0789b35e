use crate::cli::args::{Args, Command, ConfigCommand, MonitorArgs, PortArgs, SendArgs, SendCommand};
use crate::cli::output::{parse_value, ConsoleWriter, OutputWriter};
use crate::core::link::{Command as LinkCommand, FailsafeNotice, LinkManager, FAILSAFE_EVENT};
use crate::domain::config::{LinkConfig, ThermoLinkConfig};
use crate::domain::error::{LinkError, LinkResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Execute CLI command
pub async fn execute_command(args: Args) -> LinkResult<()> {
    let writer = ConsoleWriter::new(args.output);

    let config_manager = ConfigManager::new();
    let config = if let Some(config_path) = &args.config {
        config_manager.load_config_from_path(config_path.as_ref())?
    } else {
        config_manager.load_config()?
    };

    if !args.quiet {
        let level = if args.verbose { "debug" } else { config.global.log_level.as_str() };
        init_logging(level).map_err(|e| LinkError::Config {
            message: format!("Failed to initialize logging: {}", e),
        })?;
    }

    match args.command {
        Command::Ports => {
            let manager = LinkManager::new(config.link);
            let ports = manager.list_port_details()?;
            writer.write_ports(&ports)?;
            Ok(())
        }
        Command::Monitor(monitor_args) => execute_monitor(monitor_args, &writer, &config).await,
        Command::Send(send_args) => execute_send(send_args, &writer, &config).await,
        Command::Config(config_args) => match config_args.command {
            ConfigCommand::Show => {
                writer.write_config(&config)?;
                Ok(())
            }
            ConfigCommand::Init { path } => {
                let dir = match path {
                    Some(path) => PathBuf::from(path),
                    None => std::env::current_dir()?,
                };
                let file = config_manager.init_project_config(&dir)?;
                writer.write_message(&format!("Created {}", file.display()))?;
                Ok(())
            }
        },
        Command::Version => {
            writer.write_message(&format!("thermolink {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

/// Apply command line overrides on top of the loaded link configuration.
fn link_config(base: &LinkConfig, args: &PortArgs) -> LinkConfig {
    let mut link = base.clone();
    if let Some(baud) = args.baud {
        link.baud_rate = baud;
    }
    if let Some(timeout) = args.failsafe_timeout {
        link.failsafe_timeout_secs = timeout;
    }
    if let Some(timeout) = args.write_timeout {
        link.write_timeout_secs = Some(timeout);
    }
    if args.no_heartbeat {
        link.heartbeat_enabled = false;
    }
    link
}

/// Disconnect off the async runtime; joining the link threads may block.
async fn shutdown(manager: Arc<LinkManager>) -> LinkResult<()> {
    tokio::task::spawn_blocking(move || manager.disconnect())
        .await
        .map_err(|e| LinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
}

fn is_failsafe_event(payload: &serde_json::Map<String, Value>) -> bool {
    payload.get("event").and_then(Value::as_str) == Some(FAILSAFE_EVENT)
}

async fn execute_monitor(args: MonitorArgs, writer: &ConsoleWriter, config: &ThermoLinkConfig) -> LinkResult<()> {
    let manager = Arc::new(LinkManager::new(link_config(&config.link, &args.link)));
    let (_subscription, mut payloads) = manager.subscribe_channel();

    // Failsafe notices and traces arrive on the link threads; forward them
    // to this task instead of printing from there.
    let (notice_tx, mut notices) = tokio::sync::mpsc::unbounded_channel::<FailsafeNotice>();
    manager.on_failsafe(move |notice| {
        let _ = notice_tx.send(notice);
    });

    let (trace_tx, mut traces) = tokio::sync::mpsc::unbounded_channel::<(&'static str, String)>();
    if args.raw {
        let rx = trace_tx.clone();
        manager.on_rx_line(move |line| {
            let _ = rx.send(("RX", line));
        });
        manager.on_tx_line(move |line| {
            let _ = trace_tx.send(("TX", line));
        });
    }

    manager.try_connect(&args.link.port)?;
    writer.write_message(&format!("Monitoring {} (Ctrl-C to stop)", args.link.port))?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(payload) = payloads.recv() => {
                // Failsafe transitions are reported through the notice channel.
                if !is_failsafe_event(&payload) {
                    writer.write_payload(&payload)?;
                }
            }
            Some(notice) = notices.recv() => {
                writer.write_failsafe(&notice)?;
            }
            Some((direction, line)) = traces.recv() => {
                writer.write_trace(direction, &line)?;
            }
            _ = &mut ctrl_c => {
                debug!("Ctrl-C received");
                break;
            }
        }
    }

    let stats = manager.stats();
    shutdown(manager).await?;
    writer.write_stats(&stats)?;
    Ok(())
}

/// Queue the line a `send` subcommand asks for.
fn queue_send_command(manager: &LinkManager, command: &SendCommand) -> bool {
    match command {
        SendCommand::Cmd { action, state } => {
            manager.send_command(&LinkCommand::cmd(action.as_str(), parse_value(state)))
        }
        SendCommand::Set { variable, value } => {
            manager.send_command(&LinkCommand::set(variable.as_str(), parse_value(value)))
        }
        SendCommand::Calibrate { sensor, action, actual } => {
            manager.send_command(&LinkCommand::calibration(sensor.as_str(), action.as_str(), *actual))
        }
        SendCommand::ClearFailsafe => manager.clear_failsafe(),
        SendCommand::Raw { line } => manager.send(line.as_str()),
    }
}

async fn execute_send(args: SendArgs, writer: &ConsoleWriter, config: &ThermoLinkConfig) -> LinkResult<()> {
    let mut link = link_config(&config.link, &args.link);
    link.heartbeat_enabled = false;
    let manager = Arc::new(LinkManager::new(link));
    manager.try_connect(&args.link.port)?;

    let queued = queue_send_command(&manager, &args.command);

    if !queued {
        shutdown(manager).await?;
        return Err(LinkError::QueueFull);
    }

    let deadline = Instant::now() + Duration::from_millis(args.linger_ms);
    while Instant::now() < deadline && manager.stats().lines_sent == 0 {
        tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
    }

    let stats = manager.stats();
    shutdown(manager).await?;

    if stats.lines_sent == 0 {
        return Err(LinkError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("command not written within {} ms", args.linger_ms),
        )));
    }
    writer.write_message(&format!("Sent to {}", args.link.port))?;
    Ok(())
}
