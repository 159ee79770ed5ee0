//! Commodity market prices for Kerala
//!
//! Prices come from three independent sources fetched concurrently:
//! AGMARKNET (data.gov.in), the Spice Board and the Rubber Board. Whatever
//! subset succeeds is merged and cached for the configured TTL. When none of
//! them produce prices, a fallback table of eight staple commodities is served
//! with a little random jitter, and nothing is cached.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::lenient::{self, round2};
use super::{Level, Trend};
use crate::cache::{CacheKey, TimedCache};
use crate::config::MarketConfig;
use crate::fetch::{
    all_settled, read_through, send_json, FetchContext, FetchError, FetchOptions, Provided,
    Source,
};

/// Cache domain for market prices
pub const MARKET_CACHE_DOMAIN: &str = "market";

/// Maximum number of AGMARKNET records kept per fetch
const AGMARKNET_RECORD_LIMIT: usize = 10;

/// Number of AGMARKNET records requested
const AGMARKNET_REQUEST_LIMIT: &str = "50";

/// Default region label for records without one
const DEFAULT_REGION: &str = "Kerala";

/// Relative price move above which an alert is raised (percent)
const ALERT_THRESHOLD_PERCENT: f64 = 10.0;

/// Maximum number of alerts returned
const MAX_ALERTS: usize = 3;

/// Baseline prices (₹/kg) used when every source fails
const FALLBACK_COMMODITIES: [(&str, f64, &str); 8] = [
    ("Rice (Ponni)", 45.0, "Premium"),
    ("Coconut", 25.0, "Grade A"),
    ("Black Pepper", 850.0, "Export Quality"),
    ("Cardamom", 1200.0, "Large Bold"),
    ("Rubber (RSS-4)", 165.0, "RSS-4"),
    ("Ginger", 120.0, "Dry"),
    ("Turmeric", 95.0, "Finger"),
    ("Banana", 35.0, "Robusta"),
];

/// Jitter band for today's fallback price, as a fraction of the baseline
pub const FALLBACK_TODAY_JITTER: f64 = 0.05;

/// Jitter band for yesterday's fallback price, as a fraction of the baseline
pub const FALLBACK_YESTERDAY_JITTER: f64 = 0.04;

/// A price quote for one commodity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    pub commodity: String,
    /// Today's price in rupees
    pub today_price: i64,
    /// Yesterday's price in rupees
    pub yesterday_price: i64,
    /// `today_price - yesterday_price`
    pub change: i64,
    /// Change relative to yesterday, in percent with two decimals
    pub change_percent: f64,
    pub trend: Trend,
    pub demand: Level,
    pub quality: String,
    pub region: String,
}

impl MarketPrice {
    /// Builds a quote from raw prices, deriving change, trend and demand
    pub fn from_prices(
        commodity: impl Into<String>,
        today: f64,
        yesterday: f64,
        quality: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let today_price = today.round() as i64;
        let yesterday_price = yesterday.round() as i64;
        let change = today_price.saturating_sub(yesterday_price);
        let change_percent = if yesterday_price > 0 {
            round2(change as f64 / yesterday_price as f64 * 100.0)
        } else {
            0.0
        };

        Self {
            commodity: commodity.into(),
            today_price,
            yesterday_price,
            change,
            change_percent,
            trend: Trend::from_change(change),
            demand: calculate_demand(today_price, change),
            quality: quality.into(),
            region: region.into(),
        }
    }
}

/// Demand heuristic: rising prices on valuable goods mean high demand,
/// a drop of more than ₹5 means low demand
pub fn calculate_demand(price: i64, change: i64) -> Level {
    if change > 0 && price > 100 {
        Level::High
    } else if change < -5 {
        Level::Low
    } else {
        Level::Medium
    }
}

/// Kind of market alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Positive,
    Warning,
    Neutral,
}

/// A notable price move worth telling the farmer about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAlert {
    pub commodity: String,
    pub message: String,
    pub kind: AlertKind,
    pub timestamp: DateTime<Utc>,
}

/// Flags commodities whose price moved more than 10% either way, at most three
pub fn generate_market_alerts(prices: &[MarketPrice], now: DateTime<Utc>) -> Vec<MarketAlert> {
    prices
        .iter()
        .filter_map(|price| {
            if price.change_percent > ALERT_THRESHOLD_PERCENT {
                Some(MarketAlert {
                    commodity: price.commodity.clone(),
                    message: format!(
                        "Price surged {:.1}% - excellent selling opportunity!",
                        price.change_percent
                    ),
                    kind: AlertKind::Positive,
                    timestamp: now,
                })
            } else if price.change_percent < -ALERT_THRESHOLD_PERCENT {
                Some(MarketAlert {
                    commodity: price.commodity.clone(),
                    message: format!(
                        "Price dropped {:.1}% - consider holding or buying",
                        price.change_percent.abs()
                    ),
                    kind: AlertKind::Warning,
                    timestamp: now,
                })
            } else {
                None
            }
        })
        .take(MAX_ALERTS)
        .collect()
}

/// Fallback price table with jitter around fixed baselines
pub fn fallback_prices(rng: &mut impl Rng) -> Vec<MarketPrice> {
    FALLBACK_COMMODITIES
        .iter()
        .map(|(name, base, quality)| {
            let today = base
                * (1.0 + rng.random_range(-FALLBACK_TODAY_JITTER..FALLBACK_TODAY_JITTER));
            let yesterday = base
                * (1.0
                    + rng.random_range(-FALLBACK_YESTERDAY_JITTER..FALLBACK_YESTERDAY_JITTER));
            MarketPrice::from_prices(*name, today, yesterday, *quality, DEFAULT_REGION)
        })
        .collect()
}

/// Baseline price of a fallback commodity
pub fn fallback_baseline(commodity: &str) -> Option<f64> {
    FALLBACK_COMMODITIES
        .iter()
        .find(|(name, _, _)| *name == commodity)
        .map(|(_, base, _)| *base)
}

/// AGMARKNET response envelope
#[derive(Debug, Deserialize)]
struct AgmarknetResponse {
    #[serde(default)]
    records: Vec<AgmarknetRecord>,
}

#[derive(Debug, Deserialize)]
struct AgmarknetRecord {
    #[serde(default, deserialize_with = "lenient::optional_text")]
    commodity: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    modal_price: f64,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    grade: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    district: Option<String>,
}

/// Spice Board and Rubber Board share a `{"prices": [...]}` envelope
#[derive(Debug, Deserialize)]
struct PriceListResponse<T> {
    #[serde(default = "Vec::new")]
    prices: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SpiceRecord {
    #[serde(default, deserialize_with = "lenient::optional_text")]
    spice_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    current_price: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    previous_price: f64,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    price_change_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    trend: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    demand_level: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    grade: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RubberRecord {
    #[serde(default, deserialize_with = "lenient::number")]
    price: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    previous_price: f64,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    demand: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    grade: Option<String>,
}

/// AGMARKNET only reports today's modal price; yesterday's is simulated
/// within ±5% so the change columns stay meaningful.
fn normalize_agmarknet(response: AgmarknetResponse, rng: &mut impl Rng) -> Vec<MarketPrice> {
    response
        .records
        .into_iter()
        .take(AGMARKNET_RECORD_LIMIT)
        .map(|record| {
            let today = record.modal_price;
            let yesterday = today * rng.random_range(0.95..1.05);
            MarketPrice::from_prices(
                record.commodity.unwrap_or_else(|| "Unknown".to_string()),
                today,
                yesterday,
                record.grade.unwrap_or_else(|| "Standard".to_string()),
                record.district.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            )
        })
        .collect()
}

fn normalize_spices(response: PriceListResponse<SpiceRecord>) -> Vec<MarketPrice> {
    response
        .prices
        .into_iter()
        .filter_map(|item| {
            let name = item.spice_name?;
            let mut price = MarketPrice::from_prices(
                name,
                item.current_price,
                item.previous_price,
                item.grade.unwrap_or_else(|| "Standard".to_string()),
                DEFAULT_REGION,
            );
            if let Some(percent) = item.price_change_percent {
                price.change_percent = round2(percent);
            }
            if let Some(trend) = item.trend.as_deref().and_then(Trend::parse) {
                price.trend = trend;
            }
            if let Some(demand) = item.demand_level.as_deref().and_then(Level::parse) {
                price.demand = demand;
            }
            Some(price)
        })
        .collect()
}

fn normalize_rubber(response: PriceListResponse<RubberRecord>) -> Vec<MarketPrice> {
    response
        .prices
        .into_iter()
        .map(|item| {
            let grade = item.grade.unwrap_or_else(|| "RSS-4".to_string());
            let mut price = MarketPrice::from_prices(
                format!("Rubber ({})", grade),
                item.price,
                item.previous_price,
                grade,
                DEFAULT_REGION,
            );
            if let Some(demand) = item.demand.as_deref().and_then(Level::parse) {
                price.demand = demand;
            }
            price
        })
        .collect()
}

/// Provider for commodity market prices
#[derive(Debug, Clone)]
pub struct MarketProvider {
    ctx: FetchContext,
    config: MarketConfig,
    cache: TimedCache<Vec<MarketPrice>>,
}

impl MarketProvider {
    pub fn new(ctx: FetchContext, config: MarketConfig) -> Self {
        let cache = ctx.cache(config.ttl());
        Self { ctx, config, cache }
    }

    /// Cache key for a state's prices
    pub fn cache_key(state: &str) -> CacheKey {
        CacheKey::new(MARKET_CACHE_DOMAIN, &[("state", state)])
    }

    /// Fetches prices for `state` (defaults to the configured state)
    ///
    /// Always returns a non-empty list: cached, live, or fallback.
    #[instrument(skip(self, options))]
    pub async fn fetch_prices(
        &self,
        state: Option<&str>,
        options: FetchOptions,
    ) -> Provided<Vec<MarketPrice>> {
        let state = state.unwrap_or(&self.config.default_state);
        let key = Self::cache_key(state);

        read_through(
            &self.cache,
            &key,
            options,
            || async {
                let sources = vec![
                    Source::new("agmarknet", self.fetch_agmarknet(state).boxed()),
                    Source::new("spice_board", self.fetch_spice_board().boxed()),
                    Source::new("rubber_board", self.fetch_rubber_board().boxed()),
                ];
                all_settled(sources, self.ctx.timeout)
                    .await
                    .merge(|successes| {
                        let merged: Vec<MarketPrice> = successes
                            .into_iter()
                            .flat_map(|(_, prices)| prices)
                            .collect();
                        (!merged.is_empty()).then_some(merged)
                    })
            },
            || fallback_prices(&mut rand::rng()),
        )
        .await
    }

    /// Fetches prices and derives alerts from them
    pub async fn fetch_prices_with_alerts(
        &self,
        state: Option<&str>,
        options: FetchOptions,
    ) -> (Provided<Vec<MarketPrice>>, Vec<MarketAlert>) {
        let prices = self.fetch_prices(state, options).await;
        let alerts = generate_market_alerts(&prices.data, self.ctx.now());
        (prices, alerts)
    }

    async fn fetch_agmarknet(&self, state: &str) -> Result<Vec<MarketPrice>, FetchError> {
        let request = self.ctx.client.get(&self.config.agmarknet_url).query(&[
            ("api-key", self.config.agmarknet_api_key.as_str()),
            ("format", "json"),
            ("filters[state]", state),
            ("limit", AGMARKNET_REQUEST_LIMIT),
        ]);
        let response: AgmarknetResponse = send_json(request).await?;
        let prices = normalize_agmarknet(response, &mut rand::rng());
        Ok(prices)
    }

    async fn fetch_spice_board(&self) -> Result<Vec<MarketPrice>, FetchError> {
        let request = self
            .ctx
            .client
            .get(&self.config.spice_board_url)
            .header("Accept", "application/json");
        let response: PriceListResponse<SpiceRecord> = send_json(request).await?;
        Ok(normalize_spices(response))
    }

    async fn fetch_rubber_board(&self) -> Result<Vec<MarketPrice>, FetchError> {
        let request = self
            .ctx
            .client
            .get(&self.config.rubber_board_url)
            .header("Accept", "application/json");
        let response: PriceListResponse<RubberRecord> = send_json(request).await?;
        Ok(normalize_rubber(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_from_prices_derives_fields() {
        let price = MarketPrice::from_prices("Cardamom", 1260.4, 1200.0, "Large Bold", "Idukki");

        assert_eq!(price.today_price, 1260);
        assert_eq!(price.yesterday_price, 1200);
        assert_eq!(price.change, 60);
        assert_eq!(price.change_percent, 5.0);
        assert_eq!(price.trend, Trend::Up);
        assert_eq!(price.demand, Level::High);
    }

    #[test]
    fn test_from_prices_with_zero_yesterday() {
        let price = MarketPrice::from_prices("Unknown", 0.0, 0.0, "Standard", "Kerala");
        assert_eq!(price.change_percent, 0.0);
        assert_eq!(price.trend, Trend::Stable);
    }

    #[test]
    fn test_from_prices_with_extreme_values_saturates() {
        let price = MarketPrice::from_prices("x", 9.0e18, -9.0e18, "Standard", "Kerala");

        assert_eq!(price.change, i64::MAX);
        assert_eq!(price.change_percent, 0.0);
        assert_eq!(price.trend, Trend::Up);
    }

    #[test]
    fn test_calculate_demand() {
        assert_eq!(calculate_demand(150, 3), Level::High);
        assert_eq!(calculate_demand(50, 3), Level::Medium);
        assert_eq!(calculate_demand(500, -6), Level::Low);
        assert_eq!(calculate_demand(500, -5), Level::Medium);
    }

    #[test]
    fn test_fallback_prices_stay_in_jitter_band() {
        let mut rng = rng();
        for _ in 0..50 {
            let prices = fallback_prices(&mut rng);
            assert_eq!(prices.len(), 8);

            for price in &prices {
                let base = fallback_baseline(&price.commodity).expect("known commodity");
                let today_low = (base * (1.0 - FALLBACK_TODAY_JITTER)).round() as i64;
                let today_high = (base * (1.0 + FALLBACK_TODAY_JITTER)).round() as i64;
                assert!(
                    price.today_price >= today_low && price.today_price <= today_high,
                    "{} today {} outside [{}, {}]",
                    price.commodity,
                    price.today_price,
                    today_low,
                    today_high
                );

                let y_low = (base * (1.0 - FALLBACK_YESTERDAY_JITTER)).round() as i64;
                let y_high = (base * (1.0 + FALLBACK_YESTERDAY_JITTER)).round() as i64;
                assert!(price.yesterday_price >= y_low && price.yesterday_price <= y_high);
                assert_eq!(price.change, price.today_price - price.yesterday_price);
                assert_eq!(price.region, "Kerala");
            }
        }
    }

    #[test]
    fn test_normalize_agmarknet_coerces_bad_prices() {
        let response: AgmarknetResponse = serde_json::from_str(
            r#"{
                "records": [
                    {"commodity": "Banana", "modal_price": "3500", "district": "Thrissur", "grade": "FAQ"},
                    {"commodity": "Tapioca", "modal_price": "NR"},
                    {"modal_price": 1200}
                ]
            }"#,
        )
        .unwrap();

        let prices = normalize_agmarknet(response, &mut rng());

        assert_eq!(prices.len(), 3);
        assert_eq!(prices[0].commodity, "Banana");
        assert_eq!(prices[0].today_price, 3500);
        assert_eq!(prices[0].region, "Thrissur");
        assert_eq!(prices[0].quality, "FAQ");
        let ratio = prices[0].yesterday_price as f64 / 3500.0;
        assert!((0.95..=1.05).contains(&ratio));

        assert_eq!(prices[1].today_price, 0);
        assert_eq!(prices[1].yesterday_price, 0);
        assert_eq!(prices[1].quality, "Standard");
        assert_eq!(prices[1].region, "Kerala");

        assert_eq!(prices[2].commodity, "Unknown");
    }

    #[test]
    fn test_normalize_agmarknet_caps_records() {
        let records: Vec<serde_json::Value> = (0..25)
            .map(|i| serde_json::json!({"commodity": format!("C{}", i), "modal_price": 100}))
            .collect();
        let response: AgmarknetResponse =
            serde_json::from_value(serde_json::json!({ "records": records })).unwrap();

        assert_eq!(normalize_agmarknet(response, &mut rng()).len(), AGMARKNET_RECORD_LIMIT);
    }

    #[test]
    fn test_normalize_spices_prefers_reported_values() {
        let response: PriceListResponse<SpiceRecord> = serde_json::from_str(
            r#"{
                "prices": [
                    {
                        "spice_name": "Black Pepper",
                        "current_price": "862.4",
                        "previous_price": 850,
                        "price_change_percent": "1.456",
                        "trend": "up",
                        "demand_level": "low",
                        "grade": "MG-1"
                    },
                    {"current_price": 10}
                ]
            }"#,
        )
        .unwrap();

        let prices = normalize_spices(response);

        assert_eq!(prices.len(), 1, "nameless records are skipped");
        assert_eq!(prices[0].today_price, 862);
        assert_eq!(prices[0].change, 12);
        assert_eq!(prices[0].change_percent, 1.46);
        assert_eq!(prices[0].demand, Level::Low);
        assert_eq!(prices[0].quality, "MG-1");
    }

    #[test]
    fn test_normalize_rubber() {
        let response: PriceListResponse<RubberRecord> = serde_json::from_str(
            r#"{"prices": [{"price": 182, "previous_price": 185, "demand": "medium", "grade": "RSS-4"}]}"#,
        )
        .unwrap();

        let prices = normalize_rubber(response);

        assert_eq!(prices[0].commodity, "Rubber (RSS-4)");
        assert_eq!(prices[0].change, -3);
        assert_eq!(prices[0].trend, Trend::Down);
        assert_eq!(prices[0].change_percent, -1.62);
    }

    #[test]
    fn test_missing_prices_array_is_empty() {
        let response: PriceListResponse<RubberRecord> = serde_json::from_str("{}").unwrap();
        assert!(normalize_rubber(response).is_empty());
    }

    #[test]
    fn test_generate_market_alerts() {
        let now = Utc::now();
        let prices = vec![
            MarketPrice::from_prices("Ginger", 135.0, 120.0, "Dry", "Kerala"),
            MarketPrice::from_prices("Coconut", 22.0, 25.0, "Grade A", "Kerala"),
            MarketPrice::from_prices("Rice", 46.0, 45.0, "Premium", "Kerala"),
        ];

        let alerts = generate_market_alerts(&prices, now);

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].commodity, "Ginger");
        assert_eq!(alerts[0].kind, AlertKind::Positive);
        assert_eq!(
            alerts[0].message,
            "Price surged 12.5% - excellent selling opportunity!"
        );
        assert_eq!(alerts[1].kind, AlertKind::Warning);
        assert_eq!(alerts[1].message, "Price dropped 12.0% - consider holding or buying");
        assert_eq!(alerts[1].timestamp, now);
    }

    #[test]
    fn test_generate_market_alerts_caps_at_three() {
        let prices: Vec<MarketPrice> = (0..5)
            .map(|i| MarketPrice::from_prices(format!("C{}", i), 200.0, 100.0, "-", "Kerala"))
            .collect();

        assert_eq!(generate_market_alerts(&prices, Utc::now()).len(), MAX_ALERTS);
    }
}
