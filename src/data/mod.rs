//! Data providers and the records they produce
//!
//! Each provider owns one data domain (weather, market prices, farming advice)
//! and returns [`Provided`](crate::fetch::Provided) values: live, cached, or
//! fallback, but never an error.

pub mod farming;
pub mod lenient;
pub mod market;
pub mod weather;

pub use farming::{
    current_season, Coordinates, CropQuery, CropRecommendation, FarmingProvider, PestAlert,
    Season, SoilAnalysis,
};
pub use market::{generate_market_alerts, AlertKind, MarketAlert, MarketPrice, MarketProvider};
pub use weather::{Sky, WeatherProvider, WeatherReport};

use serde::{Deserialize, Serialize};

/// Direction of a price movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    /// Trend implied by a price change
    pub fn from_change(change: i64) -> Self {
        match change {
            c if c > 0 => Trend::Up,
            c if c < 0 => Trend::Down,
            _ => Trend::Stable,
        }
    }

    /// Parses upstream trend labels ("up", "Rising", "DOWN", ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" | "rising" | "increase" => Some(Trend::Up),
            "down" | "falling" | "decrease" => Some(Trend::Down),
            "stable" | "steady" | "flat" => Some(Trend::Stable),
            _ => None,
        }
    }
}

/// Three-step rating used for demand, profitability and severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Level::High),
            "medium" | "moderate" => Some(Level::Medium),
            "low" => Some(Level::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
        }
    }
}
