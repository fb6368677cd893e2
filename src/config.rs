use crate::sensor::{
    DEFAULT_I2C_ADDRESS_7BIT, DEFAULT_I2C_BUS, DeviceHandle, DistanceMode, IoVoltage,
};
use crate::session::{
    BOOT_POLL_INTERVAL, DATA_READY_POLL, DEFAULT_INTER_MEASUREMENT_MS, DEFAULT_TIMING_BUDGET_MS,
    SessionSettings, StatusPolicy,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Timing budgets the VL53L1X accepts. 15 ms is only valid in short mode.
const TIMING_BUDGETS_MS: [u16; 7] = [15, 20, 33, 50, 100, 200, 500];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub sensor: Option<SensorSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SensorSection {
    /// I2C bus number, /dev/i2c-N (default: 1)
    pub i2c_bus: Option<u8>,
    /// 7-bit device address (default: 0x29)
    pub i2c_address: Option<u8>,
    pub io_voltage: Option<IoVoltage>,
    pub distance_mode: Option<DistanceMode>,
    pub timing_budget_ms: Option<u16>,
    pub inter_measurement_ms: Option<u16>,
    pub boot_poll_interval_ms: Option<u64>,
    /// Give up waiting for boot after this long. Unset waits forever.
    pub boot_timeout_ms: Option<u64>,
    pub status_policy: Option<StatusPolicy>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Serve the status API (default: false)
    pub enabled: Option<bool>,
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.session_settings()?;
    config.log_level()?;
    Ok(config)
}

impl Config {
    fn sensor_section(&self) -> SensorSection {
        self.sensor.clone().unwrap_or_default()
    }

    pub fn io_voltage(&self) -> IoVoltage {
        self.sensor_section().io_voltage.unwrap_or(IoVoltage::Volt2_8)
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.logging
            .level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level: {}", self.logging.level)))
    }

    /// Builds validated session settings, filling unset values with the reference defaults.
    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        let section = self.sensor_section();

        let handle = DeviceHandle::new(
            section.i2c_bus.unwrap_or(DEFAULT_I2C_BUS),
            section.i2c_address.unwrap_or(DEFAULT_I2C_ADDRESS_7BIT),
        )
        .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        let distance_mode = section.distance_mode.unwrap_or(DistanceMode::Short);
        let timing_budget_ms = section.timing_budget_ms.unwrap_or(DEFAULT_TIMING_BUDGET_MS);
        if !TIMING_BUDGETS_MS.contains(&timing_budget_ms) {
            return Err(ConfigError::Invalid(format!(
                "timing_budget_ms {timing_budget_ms} not one of {TIMING_BUDGETS_MS:?}"
            )));
        }
        if timing_budget_ms == 15 && distance_mode == DistanceMode::Long {
            return Err(ConfigError::Invalid(
                "timing_budget_ms 15 requires short distance mode".to_string(),
            ));
        }

        let inter_measurement_ms = section
            .inter_measurement_ms
            .unwrap_or(DEFAULT_INTER_MEASUREMENT_MS);
        if inter_measurement_ms < timing_budget_ms {
            return Err(ConfigError::Invalid(format!(
                "inter_measurement_ms {inter_measurement_ms} is shorter than timing_budget_ms {timing_budget_ms}"
            )));
        }

        Ok(SessionSettings {
            handle,
            distance_mode,
            timing_budget_ms,
            inter_measurement_ms,
            boot_poll_interval: section
                .boot_poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(BOOT_POLL_INTERVAL),
            boot_timeout: section.boot_timeout_ms.map(Duration::from_millis),
            data_ready_poll: DATA_READY_POLL,
            status_policy: section.status_policy.unwrap_or_default(),
        })
    }

    pub fn server_enabled(&self) -> bool {
        self.server
            .as_ref()
            .and_then(|s| s.enabled)
            .unwrap_or(false)
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }
}
