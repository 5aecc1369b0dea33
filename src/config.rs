use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::aprs_writer::{AprsIsConfig, AprsIsConfigBuilder, StationInfo};

/// Environment variable overriding `[aprs] password`
pub const PASSWORD_ENV: &str = "NXDN_GPS_APRS_PASSWORD";

/// APRS-IS connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AprsSection {
    /// Gateway callsign, also used as the igate in position reports
    pub callsign: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,
}

/// Station metadata for the gateway beacon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfoSection {
    /// Hz
    #[serde(default)]
    pub tx_frequency: u32,
    /// Hz
    #[serde(default)]
    pub rx_frequency: u32,
    #[serde(default)]
    pub latitude: f32,
    #[serde(default)]
    pub longitude: f32,
    /// Metres
    #[serde(default)]
    pub height: i32,
    #[serde(default)]
    pub description: String,
}

/// Top-level gateway configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub aprs: AprsSection,
    #[serde(default)]
    pub info: InfoSection,
}

fn default_suffix() -> String {
    "N".to_string()
}

fn default_server() -> String {
    "euro.aprs2.net".to_string()
}

fn default_port() -> u16 {
    14580
}

fn default_retry_delay() -> u64 {
    1
}

fn default_max_retry_delay() -> u64 {
    60
}

impl GatewayConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config = Self::parse(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: GatewayConfig = toml::from_str(contents)?;
        config.aprs.callsign = config.aprs.callsign.trim().to_uppercase();
        if config.aprs.callsign.is_empty() {
            bail!("[aprs] callsign must not be empty");
        }
        if config.aprs.port == 0 {
            bail!("[aprs] port must be non-zero");
        }
        Ok(config)
    }

    /// Apply overrides from the environment
    pub fn apply_env(&mut self) {
        match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => self.aprs.password = Some(password),
            _ => {}
        }
    }

    pub fn aprs_is_config(&self) -> AprsIsConfig {
        AprsIsConfigBuilder::new()
            .server(self.aprs.server.clone())
            .port(self.aprs.port)
            .callsign(self.aprs.callsign.clone())
            .suffix(self.aprs.suffix.clone())
            .password(self.aprs.password.clone())
            .retry_delay_seconds(self.aprs.retry_delay)
            .max_retry_delay_seconds(self.aprs.max_retry_delay)
            .build()
    }

    pub fn station_info(&self) -> StationInfo {
        StationInfo {
            tx_frequency: self.info.tx_frequency,
            rx_frequency: self.info.rx_frequency,
            latitude: self.info.latitude,
            longitude: self.info.longitude,
            height: self.info.height,
            description: self.info.description.clone(),
        }
    }
}
