//! WeatherAPI.com forecast client
//!
//! Fetches current conditions, a multi-day forecast and any active alerts for
//! a location, and normalizes them into a [`WeatherReport`]. Without an API
//! key the provider serves a fixed snapshot for Kochi.

use chrono::NaiveDate;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::lenient;
use crate::cache::{CacheKey, TimedCache};
use crate::config::WeatherConfig;
use crate::fetch::{
    all_settled, read_through, send_json, FetchContext, FetchError, FetchOptions, Provided,
    Source,
};

/// Cache domain for weather reports
pub const WEATHER_CACHE_DOMAIN: &str = "weather";

/// Icon shown for the "Partly Cloudy" fallback snapshot
const PARTLY_CLOUDY_ICON: &str = "//cdn.weatherapi.com/weather/64x64/day/116.png";

/// Coarse sky classification used for display and advice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sky {
    Sunny,
    Cloudy,
    Rainy,
    Stormy,
    Foggy,
}

impl Sky {
    /// Classifies a free-text condition such as "Patchy light rain"
    pub fn from_condition(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("thunder") {
            Sky::Stormy
        } else if text.contains("rain") || text.contains("drizzle") || text.contains("shower") {
            Sky::Rainy
        } else if text.contains("fog") || text.contains("mist") {
            Sky::Foggy
        } else if text.contains("cloud") || text.contains("overcast") {
            Sky::Cloudy
        } else {
            Sky::Sunny
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Sky::Sunny => "☀",
            Sky::Cloudy => "☁",
            Sky::Rainy => "🌧",
            Sky::Stormy => "⛈",
            Sky::Foggy => "🌫",
        }
    }
}

/// Free-text weather condition as reported upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub text: String,
    pub icon: String,
}

impl Condition {
    pub fn sky(&self) -> Sky {
        Sky::from_condition(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub region: String,
    pub country: String,
}

/// Current conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// Temperature in Celsius
    pub temp_c: f64,
    /// Apparent temperature in Celsius
    pub feelslike_c: f64,
    pub condition: Condition,
    /// Relative humidity in percent
    pub humidity: f64,
    pub wind_kph: f64,
    pub wind_dir: String,
    pub vis_km: f64,
    pub pressure_mb: f64,
    pub uv: f64,
}

/// One forecast day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub condition: Condition,
    /// Chance of rain in percent
    pub chance_of_rain: f64,
}

/// A government weather alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub headline: String,
    pub severity: String,
    pub event: String,
    pub description: String,
}

/// Normalized weather for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: Location,
    pub current: CurrentConditions,
    pub forecast: Vec<ForecastDay>,
    pub alerts: Vec<WeatherAlert>,
}

impl WeatherReport {
    /// Fixed snapshot for Kochi, served when live data is unavailable
    pub fn kochi_snapshot(today: NaiveDate) -> Self {
        let partly_cloudy = Condition {
            text: "Partly Cloudy".to_string(),
            icon: PARTLY_CLOUDY_ICON.to_string(),
        };

        Self {
            location: Location {
                name: "Kochi".to_string(),
                region: "Kerala".to_string(),
                country: "India".to_string(),
            },
            current: CurrentConditions {
                temp_c: 32.0,
                feelslike_c: 35.0,
                condition: partly_cloudy.clone(),
                humidity: 85.0,
                wind_kph: 12.0,
                wind_dir: "SW".to_string(),
                vis_km: 8.0,
                pressure_mb: 1012.0,
                uv: 8.0,
            },
            forecast: vec![ForecastDay {
                date: today,
                max_temp_c: 32.0,
                min_temp_c: 24.0,
                condition: partly_cloudy,
                chance_of_rain: 20.0,
            }],
            alerts: Vec::new(),
        }
    }
}

/// WeatherAPI.com `forecast.json` response
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    location: ApiLocation,
    current: ApiCurrent,
    #[serde(default)]
    forecast: ApiForecast,
    #[serde(default)]
    alerts: ApiAlerts,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiCondition {
    #[serde(default)]
    text: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    #[serde(deserialize_with = "lenient::number")]
    temp_c: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    feelslike_c: f64,
    #[serde(default)]
    condition: ApiCondition,
    #[serde(default, deserialize_with = "lenient::number")]
    humidity: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    wind_kph: f64,
    #[serde(default)]
    wind_dir: String,
    #[serde(default, deserialize_with = "lenient::number")]
    vis_km: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pressure_mb: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    uv: f64,
}

#[derive(Debug, Default, Deserialize)]
struct ApiForecast {
    #[serde(default)]
    forecastday: Vec<ApiForecastDay>,
}

#[derive(Debug, Deserialize)]
struct ApiForecastDay {
    date: NaiveDate,
    day: ApiDay,
}

#[derive(Debug, Deserialize)]
struct ApiDay {
    #[serde(default, deserialize_with = "lenient::number")]
    maxtemp_c: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    mintemp_c: f64,
    #[serde(default)]
    condition: ApiCondition,
    #[serde(default, deserialize_with = "lenient::number")]
    daily_chance_of_rain: f64,
}

#[derive(Debug, Default, Deserialize)]
struct ApiAlerts {
    #[serde(default)]
    alert: Vec<ApiAlert>,
}

#[derive(Debug, Deserialize)]
struct ApiAlert {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    desc: String,
}

impl From<ApiCondition> for Condition {
    fn from(c: ApiCondition) -> Self {
        Self {
            text: c.text,
            icon: c.icon,
        }
    }
}

impl From<ForecastResponse> for WeatherReport {
    fn from(response: ForecastResponse) -> Self {
        let current = response.current;

        Self {
            location: Location {
                name: response.location.name,
                region: response.location.region,
                country: response.location.country,
            },
            current: CurrentConditions {
                temp_c: current.temp_c,
                feelslike_c: current.feelslike_c,
                condition: current.condition.into(),
                humidity: current.humidity,
                wind_kph: current.wind_kph,
                wind_dir: current.wind_dir,
                vis_km: current.vis_km,
                pressure_mb: current.pressure_mb,
                uv: current.uv,
            },
            forecast: response
                .forecast
                .forecastday
                .into_iter()
                .map(|d| ForecastDay {
                    date: d.date,
                    max_temp_c: d.day.maxtemp_c,
                    min_temp_c: d.day.mintemp_c,
                    condition: d.day.condition.into(),
                    chance_of_rain: d.day.daily_chance_of_rain,
                })
                .collect(),
            alerts: response
                .alerts
                .alert
                .into_iter()
                .map(|a| WeatherAlert {
                    headline: a.headline,
                    severity: a.severity,
                    event: a.event,
                    description: a.desc,
                })
                .collect(),
        }
    }
}

/// Provider for weather reports
#[derive(Debug, Clone)]
pub struct WeatherProvider {
    ctx: FetchContext,
    config: WeatherConfig,
    cache: TimedCache<WeatherReport>,
}

impl WeatherProvider {
    pub fn new(ctx: FetchContext, config: WeatherConfig) -> Self {
        let cache = ctx.cache(config.ttl());
        Self { ctx, config, cache }
    }

    /// Cache key for a location's weather
    pub fn cache_key(location: &str) -> CacheKey {
        CacheKey::new(WEATHER_CACHE_DOMAIN, &[("location", location)])
    }

    /// Fetches the weather for `location` (defaults to the configured location)
    #[instrument(skip(self, options))]
    pub async fn fetch_weather(
        &self,
        location: Option<&str>,
        options: FetchOptions,
    ) -> Provided<WeatherReport> {
        let location = location.unwrap_or(&self.config.default_location);
        let key = Self::cache_key(location);

        read_through(
            &self.cache,
            &key,
            options,
            || async {
                let sources = vec![Source::new(
                    "weatherapi",
                    self.fetch_forecast(location).boxed(),
                )];
                all_settled(sources, self.ctx.timeout)
                    .await
                    .merge(|successes| successes.into_iter().next().map(|(_, report)| report))
            },
            || WeatherReport::kochi_snapshot(self.ctx.now().date_naive()),
        )
        .await
    }

    async fn fetch_forecast(&self, location: &str) -> Result<WeatherReport, FetchError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(FetchError::MissingApiKey("weatherapi"))?;

        let url = format!("{}/forecast.json", self.config.base_url.trim_end_matches('/'));
        let days = self.config.forecast_days.to_string();
        let request = self.ctx.client.get(url).query(&[
            ("key", api_key),
            ("q", location),
            ("days", days.as_str()),
            ("aqi", "no"),
            ("alerts", "yes"),
        ]);

        let response: ForecastResponse = send_json(request).await?;
        Ok(response.into())
    }
}
