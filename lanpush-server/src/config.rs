//! Configuration for the lanpush server.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lanpush_core::{ChannelConfig, HeartbeatConfig, SessionConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Protocol tuning.
    pub protocol: ProtocolConfig,
    /// Heartbeat settings.
    pub heartbeat: HeartbeatSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port for the control channel.
    pub control_port: u16,
    /// TCP port for the notification channel.
    pub notification_port: u16,
}

/// Protocol tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Maximum frame size in bytes.
    pub max_frame_size: usize,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// How long an accepted connection may sit unregistered, seconds.
    pub registration_timeout_secs: u64,
}

/// Heartbeat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSection {
    /// Seconds between probe rounds.
    pub interval_secs: u64,
    /// Seconds a session has to answer a ping.
    pub timeout_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            protocol: ProtocolConfig::default(),
            heartbeat: HeartbeatSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            control_port: 4810,
            notification_port: 4811,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_size: lanpush_core::MAX_FRAME_SIZE,
            request_timeout_secs: 5,
            registration_timeout_secs: 10,
        }
    }
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            timeout_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, text)
    }

    /// Channel configuration applied to both listeners.
    pub fn to_channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            session: SessionConfig {
                request_timeout: Duration::from_secs(self.protocol.request_timeout_secs.max(1)),
                max_frame_size: self.protocol.max_frame_size.max(1024),
                ..Default::default()
            },
            registration_timeout: Duration::from_secs(
                self.protocol.registration_timeout_secs.max(1),
            ),
        }
    }

    pub fn to_heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_secs(self.heartbeat.interval_secs.max(1)),
            timeout: Duration::from_secs(self.heartbeat.timeout_secs.max(1)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
