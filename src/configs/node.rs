use serde::{Deserialize, Serialize};

/// Connection settings for the audio node.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl NodeConfig {
    /// Websocket URL of the node, e.g. `ws://127.0.0.1:2333`.
    pub fn socket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: default_password(),
            secure: false,
            client_name: default_client_name(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReconnectConfig {
    /// Attempts before the transport gives up. `0` retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for the exponential backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    2333
}

fn default_password() -> String {
    "youshallnotpass".to_string()
}

fn default_client_name() -> String {
    concat!("lavabridge/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_attempts() -> u32 {
    10
}

fn default_base_delay_ms() -> u64 {
    1_000
}
