//! User settings consumed by the session core

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current settings file version
pub const SETTINGS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Retry dropped or failed connections automatically
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Haptic feedback on connect / error
    #[serde(default = "default_true")]
    pub haptic_feedback: bool,

    /// Interval of the keep-alive byte while backgrounded
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Automatic reconnect attempts per connection epoch
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Fixed delay before each automatic reconnect attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Bound on TCP connect plus key exchange
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// TERM requested for the PTY
    #[serde(default = "default_terminal_type")]
    pub terminal_type: String,
}

impl Settings {
    /// Keep-alive period; a zero in the file falls back to the default
    pub fn keepalive_interval(&self) -> Duration {
        match self.keepalive_interval_secs {
            0 => Duration::from_secs(default_keepalive_interval_secs()),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            auto_reconnect: true,
            haptic_feedback: true,
            keepalive_interval_secs: default_keepalive_interval_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            terminal_type: default_terminal_type(),
        }
    }
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_true() -> bool {
    true
}

fn default_keepalive_interval_secs() -> u64 {
    20
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_terminal_type() -> String {
    "xterm-256color".to_string()
}
