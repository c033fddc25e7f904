use std::time::Duration;

use crate::net::{DEFAULT_MTU, MAX_MTU, MIN_MTU};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("tick interval must be greater than zero")]
    ZeroTickInterval,
    #[error("session timeout ({timeout:?}) must exceed the tick interval ({tick:?})")]
    TimeoutTooShort { timeout: Duration, tick: Duration },
    #[error("max sessions must be at least 1")]
    NoSessions,
    #[error("mtu {0} outside 400..=1500")]
    MtuOutOfRange(u16),
    #[error("server name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tick_interval: Duration,
    pub session_timeout: Duration,
    pub max_sessions: usize,
    pub mtu: u16,
    pub server_name: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1),
            session_timeout: Duration::from_secs(10),
            max_sessions: 32,
            mtu: DEFAULT_MTU,
            server_name: "MCPE Server".to_string(),
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.session_timeout <= self.tick_interval {
            return Err(ConfigError::TimeoutTooShort {
                timeout: self.session_timeout,
                tick: self.tick_interval,
            });
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::NoSessions);
        }
        if !(MIN_MTU..=MAX_MTU).contains(&self.mtu) {
            return Err(ConfigError::MtuOutOfRange(self.mtu));
        }
        if self.server_name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(TransportConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = TransportConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTickInterval));

        let config = TransportConfig {
            session_timeout: Duration::from_millis(1),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeoutTooShort { .. })
        ));

        let config = TransportConfig {
            max_sessions: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoSessions));

        let config = TransportConfig {
            mtu: 200,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MtuOutOfRange(200)));

        let config = TransportConfig {
            server_name: "  ".into(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyName));
    }
}
