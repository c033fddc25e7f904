use glam::Vec3;

use mcpe_raknet::{ConfigError, DEFAULT_PORT, TransportConfig};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub transport: TransportConfig,
    pub world_seed: i32,
    pub spawn: Vec3,
    pub world_time: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            transport: TransportConfig::default(),
            world_seed: 0,
            spawn: Vec3::new(128.0, 64.0, 128.0),
            world_time: 333_333,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:19132");
        assert!(config.validate().is_ok());
    }
}
