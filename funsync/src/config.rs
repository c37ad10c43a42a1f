//! Configuration loading and device preference tables
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (via clap `env` fallbacks)
//! 3. TOML config file (explicit `--config` path, else the platform default)
//! 4. Compiled default (fallback)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration
///
/// All fields have compiled defaults so a config file is optional. The
/// defaults match the reference hardware setup: instructions span the full
/// `[0, 100]` position range, devices are kept alive every 5 seconds, and a
/// scan for new devices runs for 5 seconds out of every 10.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Websocket address of the Intiface Central server
    pub server_address: String,
    /// Multiplier applied to script positions before clamping
    pub speed_multiplier: f64,
    /// Position clamp bounds `[low, high]`, applied after the multiplier
    pub speed_range: [f64; 2],
    /// Playback discontinuity threshold in milliseconds
    pub jump_threshold_ms: f64,
    /// Resend interval while no new instruction arrives, in seconds
    pub keep_alive_interval_secs: f64,
    /// Instruction resent before any script instruction has been issued
    pub idle_instruction: f64,
    /// How long each device scan stays open, in seconds
    pub scan_window_secs: f64,
    /// Period between scan starts, in seconds
    pub scan_cycle_secs: f64,
    /// Path to the mpv binary
    pub mpv_path: String,
    /// Per-device actuator range preferences
    #[serde(rename = "device")]
    pub devices: Vec<DevicePreference>,
}

/// Output range preferences for one device
///
/// Matched against connected devices by `name` first, then by ordinal
/// `index`. A device with no matching entry runs unrestricted.
#[derive(Debug, Clone, Deserialize)]
pub struct DevicePreference {
    pub name: Option<String>,
    pub index: Option<u32>,
    #[serde(default, rename = "actuator")]
    pub actuators: Vec<ActuatorPreference>,
}

/// Output sub-range for one actuator of a device
///
/// Matched by feature `description` first, then by ordinal `index`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorPreference {
    pub description: Option<String>,
    pub index: Option<u32>,
    /// Instructions are clamped into `[min, max]` before sending
    pub range: [f64; 2],
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_address: "ws://127.0.0.1:12345".to_string(),
            speed_multiplier: 1.0,
            speed_range: [0.0, 100.0],
            jump_threshold_ms: 100.0,
            keep_alive_interval_secs: 5.0,
            idle_instruction: 0.0,
            scan_window_secs: 5.0,
            scan_cycle_secs: 10.0,
            mpv_path: "mpv".to_string(),
            devices: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// An explicit path must exist and parse; errors are fatal. Without an
    /// explicit path the platform default location is tried, and a missing
    /// file yields the compiled defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Config> {
        let config = match explicit_path {
            Some(path) => Self::parse_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::parse_file(&path)?,
                _ => Config::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file path for the platform
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("funsync").join("config.toml"))
    }

    fn parse_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::Config(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Check value ranges that later arithmetic depends on
    fn validate(&self) -> Result<()> {
        let [lo, hi] = self.speed_range;
        if !(lo <= hi) {
            return Err(Error::Config(format!(
                "speed_range must be ordered, got [{}, {}]",
                lo, hi
            )));
        }
        if self.jump_threshold_ms <= 0.0 {
            return Err(Error::Config(
                "jump_threshold_ms must be positive".to_string(),
            ));
        }
        if self.keep_alive_interval_secs <= 0.0 {
            return Err(Error::Config(
                "keep_alive_interval_secs must be positive".to_string(),
            ));
        }
        if self.scan_window_secs <= 0.0 || self.scan_cycle_secs < self.scan_window_secs {
            return Err(Error::Config(format!(
                "scan window/cycle must satisfy 0 < window <= cycle, got {}/{}",
                self.scan_window_secs, self.scan_cycle_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.idle_instruction) {
            return Err(Error::Config(format!(
                "idle_instruction must lie in [0, 1], got {}",
                self.idle_instruction
            )));
        }
        for (d, device) in self.devices.iter().enumerate() {
            for (a, actuator) in device.actuators.iter().enumerate() {
                let [min, max] = actuator.range;
                if !(0.0 <= min && min <= max && max <= 1.0) {
                    return Err(Error::Config(format!(
                        "device {} actuator {}: range [{}, {}] must satisfy 0 <= min <= max <= 1",
                        d, a, min, max
                    )));
                }
            }
        }
        Ok(())
    }
}
