use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// HMAC secret for slot QR tokens. Set this in production: tokens
    /// signed with a generated secret die with the process.
    #[serde(default = "default_signing_secret")]
    pub secret: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: default_signing_secret(),
        }
    }
}

fn default_signing_secret() -> String {
    // Generate a random secret if not provided
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    #[serde(default)]
    pub region: RegionBounds,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            region: RegionBounds::default(),
        }
    }
}

/// Latitude/longitude box for the supported service region.
/// Defaults cover the Philippines.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionBounds {
    #[serde(default = "default_min_lat")]
    pub min_lat: f64,
    #[serde(default = "default_max_lat")]
    pub max_lat: f64,
    #[serde(default = "default_min_lon")]
    pub min_lon: f64,
    #[serde(default = "default_max_lon")]
    pub max_lon: f64,
}

impl RegionBounds {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }
}

impl Default for RegionBounds {
    fn default() -> Self {
        Self {
            min_lat: default_min_lat(),
            max_lat: default_max_lat(),
            min_lon: default_min_lon(),
            max_lon: default_max_lon(),
        }
    }
}

fn default_min_lat() -> f64 {
    4.5
}

fn default_max_lat() -> f64 {
    21.5
}

fn default_min_lon() -> f64 {
    116.0
}

fn default_max_lon() -> f64 {
    127.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            signing: SigningConfig::default(),
            verification: VerificationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
