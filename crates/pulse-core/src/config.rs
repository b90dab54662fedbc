use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub service: String,
    pub mqtt: MqttConfig,
    pub storage: StorageConfig,
    pub reports: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub dir: PathBuf,
    pub charts: ChartMode,
}

/// Chart capability, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartMode {
    Vector,
    Off,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service: "pulse".to_string(),
            mqtt: MqttConfig::default(),
            storage: StorageConfig::default(),
            reports: ReportConfig::default(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "pulse".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 5,
            reconnect_secs: 1,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "pulse.db".to_string(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reports"),
            charts: ChartMode::Vector,
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from a TOML file. A missing file yields defaults;
    /// `PULSE_MQTT_URL` and `PULSE_DB_PATH` override the file either way.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(ConfigError::Read {
                    message: err.to_string(),
                });
            }
        };
        let mut config: Self = toml::from_str(&content).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })?;
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("PULSE_MQTT_URL") {
            let (host, port) = parse_mqtt_url(&url)?;
            self.mqtt.host = host;
            self.mqtt.port = port;
        }
        if let Ok(path) = env::var("PULSE_DB_PATH") {
            self.storage.path = path;
        }
        Ok(())
    }
}

fn parse_mqtt_url(url: &str) -> Result<(String, u16), ConfigError> {
    let rest = url.strip_prefix("mqtt://").unwrap_or(url);
    let invalid = || ConfigError::InvalidValue {
        key: "PULSE_MQTT_URL".to_string(),
        value: url.to_string(),
    };
    match rest.split_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse().map_err(|_| invalid())?;
            Ok((host.to_string(), port))
        }
        None if !rest.is_empty() => Ok((rest.to_string(), 1883)),
        _ => Err(invalid()),
    }
}
