use serde::{Deserialize, Serialize};

/// Defaults applied when the client asks the platform to join a channel and
/// when a new player is created.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    #[serde(default = "default_true")]
    pub self_deaf: bool,
    #[serde(default)]
    pub self_mute: bool,
    #[serde(default = "default_volume")]
    pub default_volume: u16,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            self_deaf: true,
            self_mute: false,
            default_volume: default_volume(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_volume() -> u16 {
    100
}
