use crate::domain::error::{LinkError, LinkResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// ThermoLink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThermoLinkConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Serial link configuration
    #[serde(default)]
    pub link: LinkConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Serial link tuning.
///
/// The read and write timeouts bound how long a link thread can stay blocked
/// inside the transport, so both must stay below `join_timeout_ms` for
/// `disconnect()` to finish within the join bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Baud rate used for every port opened by the manager
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Seconds between heartbeat commands
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: f64,
    /// Send heartbeats while connected
    #[serde(default = "default_heartbeat_enabled")]
    pub heartbeat_enabled: bool,
    /// Seconds without an inbound line before the watchdog trips
    #[serde(default = "default_failsafe_timeout")]
    pub failsafe_timeout_secs: f64,
    /// Seconds a single write may block; absent means the OS default
    #[serde(default)]
    pub write_timeout_secs: Option<f64>,
    /// Outbound queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-attempt transport read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Bound on each thread join during disconnect, in milliseconds
    #[serde(default = "default_join_timeout")]
    pub join_timeout_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_heartbeat_interval() -> f64 {
    1.0
}

fn default_heartbeat_enabled() -> bool {
    true
}

fn default_failsafe_timeout() -> f64 {
    5.0
}

fn default_queue_capacity() -> usize {
    10
}

fn default_read_timeout() -> u64 {
    100
}

fn default_join_timeout() -> u64 {
    2000
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_enabled: default_heartbeat_enabled(),
            failsafe_timeout_secs: default_failsafe_timeout(),
            write_timeout_secs: None,
            queue_capacity: default_queue_capacity(),
            read_timeout_ms: default_read_timeout(),
            join_timeout_ms: default_join_timeout(),
        }
    }
}

/// Seconds to a Duration; values `validate` rejects map to zero.
fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

impl LinkConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        secs_to_duration(self.heartbeat_interval_secs)
    }

    pub fn failsafe_timeout(&self) -> Duration {
        secs_to_duration(self.failsafe_timeout_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_secs.map(secs_to_duration)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Reject settings the link threads cannot run with.
    pub fn validate(&self) -> LinkResult<()> {
        let invalid = |message: String| Err(LinkError::Config { message });

        if self.baud_rate == 0 {
            return invalid("baud_rate must be positive".to_string());
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1".to_string());
        }
        if !(self.heartbeat_interval_secs.is_finite() && self.heartbeat_interval_secs > 0.0) {
            return invalid(format!(
                "heartbeat_interval_secs must be positive, got {}",
                self.heartbeat_interval_secs
            ));
        }
        if !(self.failsafe_timeout_secs.is_finite() && self.failsafe_timeout_secs > 0.0) {
            return invalid(format!(
                "failsafe_timeout_secs must be positive, got {}",
                self.failsafe_timeout_secs
            ));
        }
        if self.read_timeout_ms == 0 || self.read_timeout_ms >= self.join_timeout_ms {
            return invalid(format!(
                "read_timeout_ms ({}) must be positive and below join_timeout_ms ({})",
                self.read_timeout_ms, self.join_timeout_ms
            ));
        }
        if let Some(secs) = self.write_timeout_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return invalid(format!("write_timeout_secs must be positive, got {}", secs));
            }
            if secs_to_duration(secs) >= self.join_timeout() {
                return invalid(format!(
                    "write_timeout_secs ({}) must be below join_timeout_ms ({})",
                    secs, self.join_timeout_ms
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = ThermoLinkConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: ThermoLinkConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.link, config.link);
    }

    #[test]
    fn test_partial_link_section_uses_defaults() {
        let config: ThermoLinkConfig = toml::from_str(
            r#"
            [link]
            failsafe_timeout_secs = 2.5
            write_timeout_secs = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.link.failsafe_timeout(), Duration::from_millis(2500));
        assert_eq!(config.link.write_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.link.queue_capacity, 10);
        assert_eq!(config.link.baud_rate, 115_200);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(LinkConfig::default().validate().is_ok());
    }

    #[test]
    fn test_negative_timeout_rejected_without_panic() {
        let config = LinkConfig {
            failsafe_timeout_secs: -1.0,
            ..LinkConfig::default()
        };
        assert_eq!(config.failsafe_timeout(), Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = LinkConfig {
            queue_capacity: 0,
            ..LinkConfig::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_read_timeout_above_join_bound() {
        let config = LinkConfig {
            read_timeout_ms: 3000,
            join_timeout_ms: 2000,
            ..LinkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_write_timeout_above_join_bound() {
        let config = LinkConfig {
            write_timeout_secs: Some(5.0),
            ..LinkConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
