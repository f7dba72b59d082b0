//! Driver configuration
//!
//! Tunables for the serial engine. Every field has a default matching a
//! stock TinyG board, so a partial TOML/JSON document deserializes cleanly.

use crate::error::{ConnectionError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one driver instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Size of the device's serial receive buffer in bytes
    pub buffer_capacity: usize,
    /// Longest inbound line the framer accepts before resyncing
    pub max_line_length: usize,
    /// Pause after each ordinary configuration write
    pub setting_write_delay_ms: u64,
    /// Pause after changing the status report format; the board stops
    /// processing while it writes the new format to EEPROM
    pub status_report_format_delay_ms: u64,
    /// Status report interval pushed to the board on connect
    pub status_interval_ms: u64,
    /// How long to wait for the build number reply after connecting
    pub watchdog_timeout_ms: u64,
    /// Oldest firmware build accepted without a `BuildError`
    pub min_build_version: f64,
    /// Treat status code 60 (zero-length move) as an error that throttles
    pub throttle_on_zero_length_move: bool,
    /// Capacity of the broadcast channel behind the event dispatcher
    pub event_channel_capacity: usize,
    /// Serial read timeout; bounds how quickly the reader notices shutdown
    pub read_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 254,
            max_line_length: 1024,
            setting_write_delay_ms: 100,
            status_report_format_delay_ms: 600,
            status_interval_ms: 150,
            watchdog_timeout_ms: 5000,
            min_build_version: 380.08,
            throttle_on_zero_length_move: false,
            event_channel_capacity: 1024,
            read_timeout_ms: 50,
        }
    }
}

impl DriverConfig {
    /// Delay between ordinary setting writes
    pub fn setting_write_delay(&self) -> Duration {
        Duration::from_millis(self.setting_write_delay_ms)
    }

    /// Delay after a status report format write
    pub fn status_report_format_delay(&self) -> Duration {
        Duration::from_millis(self.status_report_format_delay_ms)
    }

    /// Build number watchdog window
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    /// Serial read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "buffer_capacity must be greater than zero".to_string(),
            }
            .into());
        }
        if self.max_line_length == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "max_line_length must be greater than zero".to_string(),
            }
            .into());
        }
        if self.event_channel_capacity == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "event_channel_capacity must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = DriverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_capacity, 254);
        assert_eq!(config.setting_write_delay(), Duration::from_millis(100));
        assert!(config.status_report_format_delay() > config.setting_write_delay());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = DriverConfig {
            buffer_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DriverConfig =
            serde_json::from_str(r#"{"buffer_capacity": 1024, "watchdog_timeout_ms": 200}"#)
                .unwrap();
        assert_eq!(config.buffer_capacity, 1024);
        assert_eq!(config.watchdog_timeout(), Duration::from_millis(200));
        assert_eq!(config.max_line_length, 1024);
        assert!(!config.throttle_on_zero_length_move);
    }
}
