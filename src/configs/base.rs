use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    common::errors::{LavaError, Result},
    configs::*,
};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Loads `config.toml`, falling back to `config.default.toml`.
    pub fn load() -> Result<Self> {
        let config_path = if Path::new("config.toml").exists() {
            "config.toml"
        } else if Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err(LavaError::Config(
                "config.toml or config.default.toml not found".into(),
            ));
        };

        Self::from_path(config_path)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading configuration from: {}", path.display());

        let config_str = std::fs::read_to_string(path)
            .map_err(|e| LavaError::Config(format!("{}: {}", path.display(), e)))?;
        if config_str.trim().is_empty() {
            return Err(LavaError::Config(format!("{} is empty", path.display())));
        }

        Self::from_toml(&config_str)
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| LavaError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sections_fall_back_to_defaults() {
        let config = Config::from_toml("[node]\nhost = \"lava.local\"\n").unwrap();
        assert_eq!(config.node.host, "lava.local");
        assert_eq!(config.node.port, 2333);
        assert_eq!(config.node.socket_url(), "ws://lava.local:2333");
        assert!(config.player.self_deaf);
        assert_eq!(config.player.default_volume, 100);
        assert!(config.logging.is_none());
    }

    #[test]
    fn secure_node_uses_wss() {
        let config = Config::from_toml(
            r#"
            [node]
            host = "node.example.com"
            port = 443
            secure = true

            [node.reconnect]
            max_attempts = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.node.socket_url(), "wss://node.example.com:443");
        assert_eq!(config.node.reconnect.max_attempts, 0);
        assert_eq!(config.node.reconnect.base_delay_ms, 1_000);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = Config::from_toml("[node\nport = ").unwrap_err();
        assert!(matches!(err, LavaError::Config(_)));
    }
}
