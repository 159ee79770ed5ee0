//! Application wiring
//!
//! Builds the shared HTTP client, cache store and clock once and hands them to
//! every provider, then dispatches CLI commands to the right provider.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{CacheStore, FileStore, MemoryStore};
use crate::cli::Command;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::data::{
    AlertKind, CropQuery, CropRecommendation, FarmingProvider, MarketAlert, MarketPrice,
    MarketProvider, PestAlert, SoilAnalysis, WeatherProvider, WeatherReport,
};
use crate::fetch::{build_client, FetchContext, FetchOptions, Provided};

/// Result of one command, ready for rendering
#[derive(Debug)]
pub enum Outcome {
    Weather(Provided<WeatherReport>),
    Market {
        prices: Provided<Vec<MarketPrice>>,
        alerts: Vec<MarketAlert>,
    },
    Crops(Provided<Vec<CropRecommendation>>),
    Pests(Provided<Vec<PestAlert>>),
    Soil(Provided<SoilAnalysis>),
}

impl Outcome {
    /// True when the command could only serve fallback data
    pub fn is_fallback(&self) -> bool {
        match self {
            Outcome::Weather(p) => p.origin.is_fallback(),
            Outcome::Market { prices, .. } => prices.origin.is_fallback(),
            Outcome::Crops(p) => p.origin.is_fallback(),
            Outcome::Pests(p) => p.origin.is_fallback(),
            Outcome::Soil(p) => p.origin.is_fallback(),
        }
    }
}

/// All providers over one shared context
#[derive(Debug, Clone)]
pub struct App {
    pub weather: WeatherProvider,
    pub market: MarketProvider,
    pub farming: FarmingProvider,
}

impl App {
    /// Creates the providers with an explicit store and clock
    pub fn new(config: &AppConfig, store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        let ctx = FetchContext {
            client: build_client(&config.http.user_agent),
            timeout: config.http.timeout(),
            store,
            clock,
        };

        Self {
            weather: WeatherProvider::new(ctx.clone(), config.weather.clone()),
            market: MarketProvider::new(ctx.clone(), config.market.clone()),
            farming: FarmingProvider::new(ctx, config.farming.clone()),
        }
    }

    /// Creates the providers over the on-disk cache and the system clock
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config, open_store(config.cache_dir.as_deref()), Arc::new(SystemClock))
    }

    /// Runs one command
    pub async fn execute(&self, command: &Command, options: FetchOptions) -> Outcome {
        match command {
            Command::Weather { location } => {
                Outcome::Weather(self.weather.fetch_weather(location.as_deref(), options).await)
            }
            Command::Market { state } => {
                let (prices, alerts) = self
                    .market
                    .fetch_prices_with_alerts(state.as_deref(), options)
                    .await;
                let warnings = alerts
                    .iter()
                    .filter(|a| a.kind == AlertKind::Warning)
                    .count();
                info!(alerts = alerts.len(), warnings, "market alerts generated");
                Outcome::Market { prices, alerts }
            }
            Command::Crops {
                location,
                soil,
                season,
            } => {
                let query = CropQuery {
                    location: location.clone(),
                    soil_type: soil.clone(),
                    season: *season,
                };
                Outcome::Crops(self.farming.crop_recommendations(&query, options).await)
            }
            Command::Pests { location } => {
                Outcome::Pests(self.farming.pest_alerts(location.as_deref()).await)
            }
            Command::Soil { .. } => {
                Outcome::Soil(self.farming.analyze_soil(command.coordinates()).await)
            }
        }
    }
}

/// Opens the cache directory, or an in-memory store if there is none
pub fn open_store(cache_dir: Option<&Path>) -> Arc<dyn CacheStore> {
    let store = match cache_dir {
        Some(dir) => Some(FileStore::with_dir(dir.to_path_buf())),
        None => FileStore::new(),
    };

    match store {
        Some(store) => {
            info!(dir = %store.dir().display(), "using on-disk cache");
            Arc::new(store)
        }
        None => {
            warn!("no cache directory available, caching in memory for this run");
            Arc::new(MemoryStore::new())
        }
    }
}
