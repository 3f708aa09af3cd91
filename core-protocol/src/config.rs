//! # Protocol Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry settings for [`WebSocketProtocolClient`](crate::client::WebSocketProtocolClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Send a `ping` this often while connected. Default: 30 s.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// Close the socket if no `pong` arrives this long after a `ping`.
    /// Default: 10 s.
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout: Duration,

    /// Response wait for requests that do not set their own. Default: 30 s.
    #[serde(default = "default_response_timeout")]
    pub default_response_timeout: Duration,

    /// First reconnect delay; attempt `n` waits `base * 2^(n-1)`. Default: 1 s.
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay: Duration,

    /// Default: 5.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_true")]
    pub enable_heartbeat: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            pong_timeout: default_pong_timeout(),
            default_response_timeout: default_response_timeout(),
            reconnect_base_delay: default_reconnect_base_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            enable_heartbeat: true,
        }
    }
}

impl ProtocolConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval.is_zero() {
            return Err("heartbeat_interval must be > 0".to_string());
        }

        if self.pong_timeout.is_zero() {
            return Err("pong_timeout must be > 0".to_string());
        }

        if self.pong_timeout >= self.heartbeat_interval {
            return Err("pong_timeout must be shorter than heartbeat_interval".to_string());
        }

        if self.default_response_timeout.is_zero() {
            return Err("default_response_timeout must be > 0".to_string());
        }

        if self.reconnect_base_delay.is_zero() {
            return Err("reconnect_base_delay must be > 0".to_string());
        }

        if self.max_reconnect_attempts > 16 {
            return Err("max_reconnect_attempts cannot exceed 16".to_string());
        }

        Ok(())
    }
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_pong_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reconnect_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProtocolConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.pong_timeout, Duration::from_secs(10));
        assert_eq!(config.default_response_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect_base_delay, Duration::from_secs(1));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!(config.enable_heartbeat);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = ProtocolConfig {
            pong_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("pong_timeout"));

        let config = ProtocolConfig {
            reconnect_base_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProtocolConfig {
            max_reconnect_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: ProtocolConfig =
            serde_json::from_str(r#"{"max_reconnect_attempts": 2}"#).unwrap();
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }
}
