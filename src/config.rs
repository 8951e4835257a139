//! Configuration for wingbridge
//!
//! Deployment constants with YAML overrides. Every field has a default
//! matching the stock installation, so a missing config file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub lighting: LightingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Mixing console (OSC/UDP) connection and gain limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_console_host")]
    pub host: String,
    #[serde(default = "default_console_port")]
    pub port: u16,
    /// Local port bound for query replies
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Preamp gain limits and encoder step, in dB
    #[serde(default = "default_gain_min")]
    pub gain_min: f32,
    #[serde(default = "default_gain_max")]
    pub gain_max: f32,
    #[serde(default = "default_gain_step")]
    pub gain_step: f32,
}

/// Control surface (MIDI) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SurfaceConfig {
    /// Port name fragment used when no "X-TOUCH-" port is present
    #[serde(default = "default_port_fragment")]
    pub port_fragment: String,
    /// No MIDI traffic for this long counts as disconnected
    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,
    /// Strips whose fader moves are always forwarded (no touch sensor)
    #[serde(default = "default_live_strips")]
    pub live_strips: Vec<u8>,
}

/// DMX dimmer line (serial) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LightingConfig {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// USB description fragments identifying the dongle
    #[serde(default = "default_port_hints")]
    pub port_hints: Vec<String>,
}

/// Reconciliation and supervision cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval_ms")]
    pub interval_ms: u64,
    /// Fader hysteresis, in position units (1.5% of range)
    #[serde(default = "default_deadband")]
    pub deadband: u16,
    /// Gain changes below this don't rewrite the LED ring, in dB
    #[serde(default = "default_gain_epsilon")]
    pub gain_epsilon_db: f32,
    /// Consecutive failed ticks before forcing a connectivity check
    #[serde(default = "default_max_tick_failures")]
    pub max_tick_failures: u32,
    #[serde(default = "default_surface_check_ms")]
    pub surface_check_ms: u64,
    #[serde(default = "default_console_check_ms")]
    pub console_check_ms: u64,
    /// Failed surface reconnects before the error is escalated to the log
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the stock deployment constants; a present
    /// but malformed file is an error.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!("No config file at {path}, using built-in defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        let config: AppConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {path}"))?;
        Ok(config)
    }
}

impl ConsoleConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl SurfaceConfig {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn surface_check_interval(&self) -> Duration {
        Duration::from_millis(self.surface_check_ms)
    }

    pub fn console_check_interval(&self) -> Duration {
        Duration::from_millis(self.console_check_ms)
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            host: default_console_host(),
            port: default_console_port(),
            local_port: default_local_port(),
            query_timeout_ms: default_query_timeout_ms(),
            gain_min: default_gain_min(),
            gain_max: default_gain_max(),
            gain_step: default_gain_step(),
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            port_fragment: default_port_fragment(),
            liveness_timeout_ms: default_liveness_timeout_ms(),
            live_strips: default_live_strips(),
        }
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            port_hints: default_port_hints(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sync_interval_ms(),
            deadband: default_deadband(),
            gain_epsilon_db: default_gain_epsilon(),
            max_tick_failures: default_max_tick_failures(),
            surface_check_ms: default_surface_check_ms(),
            console_check_ms: default_console_check_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

fn default_console_host() -> String {
    "192.168.1.4".to_string()
}

fn default_console_port() -> u16 {
    2223
}

fn default_local_port() -> u16 {
    10024
}

fn default_query_timeout_ms() -> u64 {
    300
}

fn default_gain_min() -> f32 {
    -2.5
}

fn default_gain_max() -> f32 {
    45.0
}

fn default_gain_step() -> f32 {
    1.0
}

fn default_port_fragment() -> String {
    "xtouch".to_string()
}

fn default_liveness_timeout_ms() -> u64 {
    5000
}

fn default_live_strips() -> Vec<u8> {
    vec![5, 7]
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_port_hints() -> Vec<String> {
    vec![
        "USB".to_string(),
        "CH340".to_string(),
        "SERIAL".to_string(),
        "FT232".to_string(),
    ]
}

fn default_sync_interval_ms() -> u64 {
    500
}

fn default_deadband() -> u16 {
    15
}

fn default_gain_epsilon() -> f32 {
    0.5
}

fn default_max_tick_failures() -> u32 {
    3
}

fn default_surface_check_ms() -> u64 {
    2000
}

fn default_console_check_ms() -> u64 {
    60_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}
