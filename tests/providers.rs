//! Provider integration tests against a local mock HTTP server
//!
//! Covers the cache-or-fetch-or-fallback behavior end to end: TTL expiry,
//! partial source failure, total failure, and cache keys per request.

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;

use krishi::cache::{CacheStore, FileStore, MemoryStore};
use krishi::clock::ManualClock;
use krishi::config::{AppConfig, FarmingConfig, MarketConfig, WeatherConfig};
use krishi::data::market::{fallback_baseline, FALLBACK_TODAY_JITTER};
use krishi::data::{
    Coordinates, CropQuery, FarmingProvider, MarketProvider, Season, WeatherProvider,
};
use krishi::fetch::{build_client, DataOrigin, FetchContext, FetchError, FetchOptions};

const START_MS: i64 = 1_720_000_000_000;

fn context(store: Arc<dyn CacheStore>, clock: &ManualClock, timeout: Duration) -> FetchContext {
    FetchContext {
        client: build_client("krishi-tests"),
        timeout,
        store,
        clock: Arc::new(clock.clone()),
    }
}

fn memory_context(clock: &ManualClock) -> FetchContext {
    context(Arc::new(MemoryStore::new()), clock, Duration::from_secs(5))
}

/// Accepts connections and never answers
async fn hanging_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}/spices", addr)
}

fn weather_body() -> String {
    json!({
        "location": {"name": "Alappuzha", "region": "Kerala", "country": "India"},
        "current": {
            "temp_c": 30.1,
            "feelslike_c": 34.0,
            "condition": {"text": "Light rain", "icon": "//cdn/296.png"},
            "humidity": 84,
            "wind_kph": 14.4,
            "wind_dir": "W",
            "vis_km": 7.0,
            "pressure_mb": 1008.0,
            "uv": 6.0
        },
        "forecast": {"forecastday": [
            {"date": "2024-07-03", "day": {"maxtemp_c": 30.5, "mintemp_c": 25.0,
                "condition": {"text": "Heavy rain", "icon": ""}, "daily_chance_of_rain": 93}}
        ]}
    })
    .to_string()
}

fn weather_config(server: &ServerGuard) -> WeatherConfig {
    WeatherConfig {
        api_key: Some("test-key".to_string()),
        base_url: server.url(),
        ..WeatherConfig::default()
    }
}

fn market_config(server: &ServerGuard) -> MarketConfig {
    MarketConfig {
        agmarknet_url: format!("{}/agmarknet", server.url()),
        spice_board_url: format!("{}/spices", server.url()),
        rubber_board_url: format!("{}/rubber", server.url()),
        ..MarketConfig::default()
    }
}

fn farming_config(server: &ServerGuard) -> FarmingConfig {
    FarmingConfig {
        conditions_url: format!("{}/conditions", server.url()),
        soil_url: format!("{}/soil", server.url()),
        market_trends_url: format!("{}/trends", server.url()),
        icrisat_url: format!("{}/icrisat", server.url()),
        state_agri_url: format!("{}/state", server.url()),
        soil_health_url: format!("{}/soil-analysis", server.url()),
        ..FarmingConfig::default()
    }
}

#[tokio::test]
async fn test_weather_is_cached_for_its_ttl() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/forecast.json")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("key".into(), "test-key".into()),
            Matcher::UrlEncoded("q".into(), "Kochi, Kerala".into()),
            Matcher::UrlEncoded("days".into(), "7".into()),
            Matcher::UrlEncoded("alerts".into(), "yes".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(weather_body())
        .expect(2)
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let provider = WeatherProvider::new(memory_context(&clock), weather_config(&server));

    let first = provider.fetch_weather(None, FetchOptions::default()).await;
    assert_eq!(first.origin.label(), "network");
    assert_eq!(first.data.location.name, "Alappuzha");

    clock.advance(Duration::from_secs(10 * 60));
    let second = provider.fetch_weather(None, FetchOptions::default()).await;
    assert!(second.origin.is_cached());
    assert_eq!(second.data, first.data);
    assert_eq!(second.updated_at, first.updated_at);

    clock.advance(Duration::from_secs(21 * 60));
    let third = provider.fetch_weather(None, FetchOptions::default()).await;
    assert_eq!(third.origin.label(), "network");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_weather_without_api_key_serves_snapshot_uncached() {
    let server = Server::new_async().await;
    let clock = ManualClock::at(START_MS);
    let store = Arc::new(MemoryStore::new());
    let config = WeatherConfig {
        api_key: None,
        ..weather_config(&server)
    };
    let provider = WeatherProvider::new(
        context(store.clone(), &clock, Duration::from_secs(5)),
        config,
    );

    let provided = provider.fetch_weather(None, FetchOptions::default()).await;

    assert_eq!(provided.data.location.name, "Kochi");
    assert_eq!(provided.data.current.temp_c, 32.0);
    match &provided.origin {
        DataOrigin::Fallback { failures } => {
            assert!(matches!(failures[0].error, FetchError::MissingApiKey(_)));
        }
        other => panic!("expected fallback, got {:?}", other),
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_weather_refresh_bypasses_cache() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/forecast.json")
        .match_query(Matcher::Any)
        .with_body(weather_body())
        .expect(2)
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let provider = WeatherProvider::new(memory_context(&clock), weather_config(&server));

    provider.fetch_weather(None, FetchOptions::default()).await;
    let refreshed = provider
        .fetch_weather(
            None,
            FetchOptions {
                force_refresh: true,
            },
        )
        .await;

    assert_eq!(refreshed.origin.label(), "network");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_corrupted_cache_file_is_refetched() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/forecast.json")
        .match_query(Matcher::Any)
        .with_body(weather_body())
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let store = FileStore::with_dir(dir.path().to_path_buf());
    let key = WeatherProvider::cache_key("Kochi, Kerala");
    store.save(key.as_str(), "{not json").unwrap();

    let clock = ManualClock::at(START_MS);
    let provider = WeatherProvider::new(
        context(Arc::new(store), &clock, Duration::from_secs(5)),
        weather_config(&server),
    );

    let provided = provider.fetch_weather(None, FetchOptions::default()).await;

    assert_eq!(provided.origin.label(), "network");
    mock.assert_async().await;

    let on_disk = std::fs::read_to_string(dir.path().join(format!("{}.json", key))).unwrap();
    let entry: serde_json::Value = serde_json::from_str(&on_disk).unwrap();
    assert_eq!(entry["timestamp"], START_MS);
    assert_eq!(entry["data"]["location"]["name"], "Alappuzha");
}

#[tokio::test]
async fn test_market_keeps_results_when_one_source_times_out() {
    let mut server = Server::new_async().await;
    let agmarknet = server
        .mock("GET", "/agmarknet")
        .match_query(Matcher::UrlEncoded("filters[state]".into(), "Kerala".into()))
        .with_body(
            json!({"records": [
                {"commodity": "Banana", "modal_price": "3500", "district": "Thrissur"},
                {"commodity": "Tapioca", "modal_price": 2400}
            ]})
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let rubber = server
        .mock("GET", "/rubber")
        .with_body(json!({"prices": [{"price": 182, "previous_price": 185, "grade": "RSS-4"}]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let config = MarketConfig {
        spice_board_url: hanging_endpoint().await,
        ..market_config(&server)
    };
    let clock = ManualClock::at(START_MS);
    let provider = MarketProvider::new(
        context(
            Arc::new(MemoryStore::new()),
            &clock,
            Duration::from_millis(300),
        ),
        config,
    );

    let first = provider.fetch_prices(None, FetchOptions::default()).await;

    let names: Vec<&str> = first.data.iter().map(|p| p.commodity.as_str()).collect();
    assert_eq!(names, vec!["Banana", "Tapioca", "Rubber (RSS-4)"]);
    match &first.origin {
        DataOrigin::Network { failed } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].source, "spice_board");
            assert!(matches!(failed[0].error, FetchError::Timeout(_)));
        }
        other => panic!("expected network origin, got {:?}", other),
    }

    clock.advance(Duration::from_secs(30 * 60));
    let second = provider.fetch_prices(None, FetchOptions::default()).await;
    assert!(second.origin.is_cached());
    assert_eq!(second.data, first.data);

    agmarknet.assert_async().await;
    rubber.assert_async().await;
}

#[tokio::test]
async fn test_market_fallback_when_all_sources_fail() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("GET", Matcher::Any)
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let store = Arc::new(MemoryStore::new());
    let provider = MarketProvider::new(
        context(store.clone(), &clock, Duration::from_secs(5)),
        market_config(&server),
    );

    let provided = provider.fetch_prices(None, FetchOptions::default()).await;

    assert!(provided.origin.is_fallback());
    assert_eq!(provided.data.len(), 8);
    for price in &provided.data {
        let base = fallback_baseline(&price.commodity).unwrap();
        let low = (base * (1.0 - FALLBACK_TODAY_JITTER)).round() as i64;
        let high = (base * (1.0 + FALLBACK_TODAY_JITTER)).round() as i64;
        assert!(price.today_price >= low && price.today_price <= high);
    }
    assert!(store.is_empty(), "fallback data must not be cached");

    failing.assert_async().await;
}

#[tokio::test]
async fn test_market_survives_out_of_range_prices() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/agmarknet")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/spices")
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/rubber")
        .with_body(json!({"prices": [{"price": 9.0e18, "previous_price": -9.0e18}]}).to_string())
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let provider = MarketProvider::new(memory_context(&clock), market_config(&server));

    let provided = provider.fetch_prices(None, FetchOptions::default()).await;

    assert_eq!(provided.origin.label(), "network");
    assert_eq!(provided.data.len(), 1);
    assert_eq!(provided.data[0].commodity, "Rubber (RSS-4)");
    assert_eq!(provided.data[0].change, i64::MAX);
}

#[tokio::test]
async fn test_market_cache_is_keyed_by_state() {
    let mut server = Server::new_async().await;
    let agmarknet = server
        .mock("GET", "/agmarknet")
        .match_query(Matcher::Any)
        .with_body(json!({"records": [{"commodity": "Rice", "modal_price": 4500}]}).to_string())
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/spices")
        .with_body(json!({"prices": []}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/rubber")
        .with_body(json!({"prices": []}).to_string())
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let provider = MarketProvider::new(memory_context(&clock), market_config(&server));

    let kerala = provider.fetch_prices(Some("Kerala"), FetchOptions::default()).await;
    let tamil_nadu = provider
        .fetch_prices(Some("Tamil Nadu"), FetchOptions::default())
        .await;
    let kerala_again = provider.fetch_prices(Some("kerala "), FetchOptions::default()).await;

    assert_eq!(kerala.origin.label(), "network");
    assert_eq!(tamil_nadu.origin.label(), "network");
    assert!(kerala_again.origin.is_cached());

    agmarknet.assert_async().await;
}

#[tokio::test]
async fn test_crop_recommendations_use_available_inputs() {
    let mut server = Server::new_async().await;
    let conditions = server
        .mock("GET", "/conditions")
        .match_query(Matcher::UrlEncoded("location".into(), "Kuttanad".into()))
        .with_body(json!({"temperature": 31, "humidity": 88, "season": "monsoon"}).to_string())
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/soil")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/trends")
        .with_body(json!({"high_demand_crops": ["ginger"]}).to_string())
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let provider = FarmingProvider::new(memory_context(&clock), farming_config(&server));
    let query = CropQuery {
        location: Some("Kuttanad".to_string()),
        soil_type: None,
        season: Some(Season::Monsoon),
    };

    let first = provider
        .crop_recommendations(&query, FetchOptions::default())
        .await;

    let ranked: Vec<(&str, u8)> = first
        .data
        .iter()
        .map(|r| (r.crop.as_str(), r.suitability))
        .collect();
    assert_eq!(
        ranked,
        vec![
            ("Rice (Ponni Variety)", 98),
            ("Coconut", 95),
            ("Ginger", 93),
            ("Black Pepper", 91),
        ]
    );
    match &first.origin {
        DataOrigin::Network { failed } => assert_eq!(failed[0].source, "soil"),
        other => panic!("expected network origin, got {:?}", other),
    }

    let second = provider
        .crop_recommendations(&query, FetchOptions::default())
        .await;
    assert!(second.origin.is_cached());

    conditions.assert_async().await;
}

#[tokio::test]
async fn test_crop_recommendations_fall_back_to_rice() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let provider = FarmingProvider::new(memory_context(&clock), farming_config(&server));

    let provided = provider
        .crop_recommendations(&CropQuery::default(), FetchOptions::default())
        .await;

    assert!(provided.origin.is_fallback());
    assert_eq!(provided.data.len(), 1);
    assert_eq!(provided.data[0].crop, "Rice (Ponni Variety)");
}

#[tokio::test]
async fn test_pest_alerts_are_not_cached() {
    let mut server = Server::new_async().await;
    let icrisat = server
        .mock("GET", "/icrisat/Kerala")
        .with_body(
            json!({"alerts": [{"pest": "Fall Armyworm", "severity": "high", "confidence": 90}]})
                .to_string(),
        )
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/state")
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/conditions")
        .match_query(Matcher::Any)
        .with_body(json!({"conditions": ["high_humidity", "warm_temperature"]}).to_string())
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let provider = FarmingProvider::new(memory_context(&clock), farming_config(&server));

    let first = provider.pest_alerts(None).await;
    let second = provider.pest_alerts(None).await;

    let names: Vec<&str> = first.data.iter().map(|a| a.pest.as_str()).collect();
    assert_eq!(names, vec!["Fall Armyworm", "Brown Plant Hopper"]);
    assert_eq!(first.data[1].region, "Kerala");
    assert_eq!(second.origin.label(), "network");

    icrisat.assert_async().await;
}

#[tokio::test]
async fn test_pest_location_stays_in_one_path_segment() {
    let mut server = Server::new_async().await;
    let icrisat = server
        .mock("GET", "/icrisat/Kochi%2FNorth%3Fx%23y")
        .with_body(
            json!({"alerts": [{"pest": "Fall Armyworm", "severity": "high", "confidence": 90}]})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/state")
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/conditions")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let provider = FarmingProvider::new(memory_context(&clock), farming_config(&server));

    let provided = provider.pest_alerts(Some("Kochi/North?x#y")).await;

    assert_eq!(provided.origin.label(), "network");
    assert_eq!(provided.data[0].pest, "Fall Armyworm");

    icrisat.assert_async().await;
}

#[tokio::test]
async fn test_soil_analysis_posts_coordinates() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/soil-analysis")
        .match_body(Matcher::PartialJson(json!({
            "coordinates": {"lat": 9.93, "lon": 76.26},
            "depth": "0-15cm",
            "analysis_type": "comprehensive"
        })))
        .with_body(json!({"ph": 5.4, "nitrogen": "210", "recommendation": "Apply lime"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let clock = ManualClock::at(START_MS);
    let provider = FarmingProvider::new(memory_context(&clock), farming_config(&server));

    let provided = provider
        .analyze_soil(Some(Coordinates {
            lat: 9.93,
            lon: 76.26,
        }))
        .await;

    assert_eq!(provided.origin.label(), "network");
    assert_eq!(provided.data.ph, 5.4);
    assert_eq!(provided.data.nitrogen, 210.0);
    assert_eq!(provided.data.phosphorus, 45.0);
    assert_eq!(provided.data.recommendation, "Apply lime");

    mock.assert_async().await;
}

#[test]
fn test_default_config_is_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.weather.ttl(), Duration::from_secs(30 * 60));
    assert_eq!(config.market.ttl(), Duration::from_secs(60 * 60));
    assert_eq!(config.farming.ttl(), Duration::from_secs(6 * 60 * 60));
}
