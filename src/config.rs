//! Application configuration
//!
//! Every provider receives its section of [`AppConfig`] at construction; there
//! is no process-wide state. Values come from, in increasing precedence:
//! built-in defaults, an optional YAML file, and `KRISHI_*` environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the WeatherAPI.com key
pub const ENV_WEATHER_API_KEY: &str = "KRISHI_WEATHER_API_KEY";
/// Environment variable holding the data.gov.in key used for AGMARKNET
pub const ENV_AGMARKNET_API_KEY: &str = "KRISHI_AGMARKNET_API_KEY";
/// Environment variable overriding the cache directory
pub const ENV_CACHE_DIR: &str = "KRISHI_CACHE_DIR";

/// Longest accepted cache lifetime (one week)
pub const MAX_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub weather: WeatherConfig,
    pub market: MarketConfig,
    pub farming: FarmingConfig,
    pub http: HttpConfig,
    /// Cache directory; defaults to the platform cache dir (`~/.cache/krishi`)
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// WeatherAPI.com key; without one the provider serves its fallback snapshot
    pub api_key: Option<String>,
    pub base_url: String,
    pub ttl_minutes: u64,
    pub default_location: String,
    pub forecast_days: u8,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.weatherapi.com/v1".to_string(),
            ttl_minutes: 30,
            default_location: "Kochi, Kerala".to_string(),
            forecast_days: 7,
        }
    }
}

impl WeatherConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub agmarknet_url: String,
    pub agmarknet_api_key: String,
    pub spice_board_url: String,
    pub rubber_board_url: String,
    pub ttl_minutes: u64,
    pub default_state: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            agmarknet_url:
                "https://api.data.gov.in/resource/9ef84268-d588-465a-a308-a864a43d0070"
                    .to_string(),
            // Public sample key published by data.gov.in
            agmarknet_api_key: "579b464db66ec23bdd0000018fc0e7e003ca4b2f07b02a65c53bfda2"
                .to_string(),
            spice_board_url: "https://spiceboard.gov.in/api/price-trends".to_string(),
            rubber_board_url: "https://rubberboard.org.in/api/daily-prices".to_string(),
            ttl_minutes: 60,
            default_state: "Kerala".to_string(),
        }
    }
}

impl MarketConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmingConfig {
    /// Agro-climate conditions for a location
    pub conditions_url: String,
    /// Soil profile for a location and soil type
    pub soil_url: String,
    /// Commodity demand trends
    pub market_trends_url: String,
    /// ICRISAT pest surveillance
    pub icrisat_url: String,
    /// Kerala agriculture department pest alerts
    pub state_agri_url: String,
    /// Soil health card analysis
    pub soil_health_url: String,
    pub ttl_minutes: u64,
    pub default_location: String,
    pub default_soil_type: String,
}

impl Default for FarmingConfig {
    fn default() -> Self {
        Self {
            conditions_url: "https://keralaagriculture.gov.in/api/agro-conditions".to_string(),
            soil_url: "https://soilhealth.dac.gov.in/api/soil-profile".to_string(),
            market_trends_url: "https://api.data.gov.in/api/market-trends".to_string(),
            icrisat_url: "https://api.icrisat.org/pest-surveillance".to_string(),
            state_agri_url: "https://keralaagriculture.gov.in/api/pest-alerts".to_string(),
            soil_health_url: "https://soilhealth.dac.gov.in/api/soil-analysis".to_string(),
            ttl_minutes: 6 * 60,
            default_location: "Kerala".to_string(),
            default_soil_type: "alluvial".to_string(),
        }
    }
}

impl FarmingConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Upper bound on each individual source call
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: concat!("krishi/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Loads configuration
    ///
    /// Search order:
    /// 1. Explicit path if provided (must exist)
    /// 2. `$XDG_CONFIG_HOME/krishi/config.yaml` if present
    /// 3. Built-in defaults
    ///
    /// Environment overrides are applied on top, then the result is validated.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Some(path) => Self::load_from_path(path)?,
            None => match Self::default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::load_from_path(&path)?,
                None => Self::default(),
            },
        };

        let config = config.with_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML config file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file deserializes as unit, not as a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    fn default_config_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", "krishi")?;
        Some(dirs.config_dir().join("config.yaml"))
    }

    /// Applies `KRISHI_*` overrides read through `lookup`
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_WEATHER_API_KEY) {
            self.weather.api_key = Some(key);
        }
        if let Some(key) = non_empty(ENV_AGMARKNET_API_KEY) {
            self.market.agmarknet_api_key = key;
        }
        if let Some(dir) = non_empty(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Rejects values that would make the providers misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttls = [
            ("weather.ttl_minutes", self.weather.ttl_minutes),
            ("market.ttl_minutes", self.market.ttl_minutes),
            ("farming.ttl_minutes", self.farming.ttl_minutes),
        ];
        for (name, value) in ttls {
            if value == 0 || value > MAX_TTL_MINUTES {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_TTL_MINUTES, value
                )));
            }
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http.timeout_secs must be positive".to_string(),
            ));
        }

        if self.weather.forecast_days == 0 || self.weather.forecast_days > 14 {
            return Err(ConfigError::Invalid(format!(
                "weather.forecast_days must be between 1 and 14, got {}",
                self.weather.forecast_days
            )));
        }

        let urls = [
            ("weather.base_url", &self.weather.base_url),
            ("market.agmarknet_url", &self.market.agmarknet_url),
            ("market.spice_board_url", &self.market.spice_board_url),
            ("market.rubber_board_url", &self.market.rubber_board_url),
            ("farming.conditions_url", &self.farming.conditions_url),
            ("farming.soil_url", &self.farming.soil_url),
            ("farming.market_trends_url", &self.farming.market_trends_url),
            ("farming.icrisat_url", &self.farming.icrisat_url),
            ("farming.state_agri_url", &self.farming.state_agri_url),
            ("farming.soil_health_url", &self.farming.soil_health_url),
        ];
        for (name, url) in urls {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} cannot be empty", name)));
            }
        }

        Ok(())
    }
}
