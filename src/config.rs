//! Configuration loaded from `~/.salondesk/config.json`.
//!
//! Every section has serde defaults, so a partial file (or no file at all)
//! yields a usable config.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::SalonError;
use crate::notification::EmailJsConfig;
use crate::payments::{DEFAULT_TAX_RATE, STRIPE_API_BASE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub business: BusinessConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub email: EmailJsConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessConfig {
    pub name: String,
    /// IANA timezone name used for day, week and month boundaries.
    pub timezone: String,
    pub currency: String,
    pub tax_rate: f64,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            name: "Nails By Sau".to_string(),
            timezone: "America/Toronto".to_string(),
            currency: "CAD".to_string(),
            tax_rate: DEFAULT_TAX_RATE,
        }
    }
}

impl BusinessConfig {
    pub fn tz(&self) -> Result<Tz, SalonError> {
        self.timezone.parse::<Tz>().map_err(|_| {
            SalonError::Configuration(format!("Unknown timezone: {}", self.timezone))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Directory for mirror files. Defaults to `~/.salondesk/mirror`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_dir: Option<String>,
}

impl StorageConfig {
    pub fn mirror_dir(&self) -> Result<PathBuf, SalonError> {
        match &self.mirror_dir {
            Some(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
            _ => Ok(config_dir()?.join("mirror")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    pub api_base: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsConfig {
    pub refresh_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
        }
    }
}

impl StatsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

fn config_dir() -> Result<PathBuf, SalonError> {
    let home = dirs::home_dir()
        .ok_or_else(|| SalonError::Configuration("Could not find home directory".to_string()))?;
    Ok(home.join(".salondesk"))
}

pub fn config_path() -> Result<PathBuf, SalonError> {
    Ok(config_dir()?.join("config.json"))
}

/// Load `~/.salondesk/config.json`.
pub fn load_config() -> Result<Config, SalonError> {
    load_config_from(&config_path()?)
}

/// A missing file gives defaults; an unreadable or malformed one is an error.
pub fn load_config_from(path: &Path) -> Result<Config, SalonError> {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| SalonError::Configuration(format!("Failed to read config: {}", e)))?;
    let config: Config = serde_json::from_str(&content)
        .map_err(|e| SalonError::Configuration(format!("Failed to parse config: {}", e)))?;

    // Fail early on a bad timezone rather than at the first stats refresh.
    config.business.tz()?;
    Ok(config)
}
