//! Crop recommendations, pest alerts and soil analysis
//!
//! Recommendations combine three inputs (agro-climate conditions, the soil
//! profile and market demand trends) and score a table of crops suited to
//! Kerala. Any subset of the inputs is enough; with none of them the provider
//! recommends rice. Pest alerts and soil analyses are always fetched live.

use chrono::Datelike;
use futures::FutureExt;
use reqwest::{IntoUrl, Url};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::lenient;
use super::Level;
use crate::cache::{CacheKey, TimedCache};
use crate::config::FarmingConfig;
use crate::fetch::{
    all_settled, read_through, send_json, FetchContext, FetchError, FetchOptions, Provided,
    Source,
};

/// Cache domain for crop recommendations
pub const RECOMMENDATIONS_CACHE_DOMAIN: &str = "farming-recommendations";

/// Suitable soil pH range; crops on soil outside it lose suitability
const SUITABLE_PH: std::ops::RangeInclusive<f64> = 5.5..=7.5;

const HIGH_DEMAND_BONUS: i32 = 5;
const SEASON_MATCH_BONUS: i32 = 3;
const UNSUITABLE_PH_PENALTY: i32 = 5;

/// Kerala's agricultural seasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Season {
    PreMonsoon,
    Monsoon,
    PostMonsoon,
}

impl Season {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "monsoon" | "kharif" => Some(Season::Monsoon),
            "post-monsoon" | "postmonsoon" | "rabi" => Some(Season::PostMonsoon),
            "pre-monsoon" | "premonsoon" | "summer" => Some(Season::PreMonsoon),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::PreMonsoon => "pre-monsoon",
            Season::Monsoon => "monsoon",
            Season::PostMonsoon => "post-monsoon",
        }
    }
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Season for a calendar month (1-12)
pub fn current_season(month: u32) -> Season {
    match month {
        6..=9 => Season::Monsoon,
        10..=12 => Season::PostMonsoon,
        _ => Season::PreMonsoon,
    }
}

/// Parameters for a recommendation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CropQuery {
    pub location: Option<String>,
    pub soil_type: Option<String>,
    /// Defaults to the current season
    pub season: Option<Season>,
}

/// A scored crop recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecommendation {
    pub crop: String,
    /// 0-100
    pub suitability: u8,
    pub season: String,
    pub expected_yield: String,
    pub profitability: Level,
    pub water_requirement: String,
    pub fertilizers: Vec<String>,
    pub diseases: Vec<String>,
    pub market_demand: Level,
}

struct CropProfile {
    crop: &'static str,
    suitability: u8,
    season: &'static str,
    expected_yield: &'static str,
    profitability: Level,
    water_requirement: &'static str,
    fertilizers: &'static [&'static str],
    diseases: &'static [&'static str],
    market_demand: Level,
}

impl CropProfile {
    /// Lowercased first word of the crop name, as used in demand lists
    fn market_name(&self) -> String {
        self.crop
            .split_whitespace()
            .next()
            .unwrap_or(self.crop)
            .to_lowercase()
    }

    fn recommend(&self, suitability: u8) -> CropRecommendation {
        CropRecommendation {
            crop: self.crop.to_string(),
            suitability,
            season: self.season.to_string(),
            expected_yield: self.expected_yield.to_string(),
            profitability: self.profitability,
            water_requirement: self.water_requirement.to_string(),
            fertilizers: self.fertilizers.iter().map(|s| s.to_string()).collect(),
            diseases: self.diseases.iter().map(|s| s.to_string()).collect(),
            market_demand: self.market_demand,
        }
    }
}

const CROPS: [CropProfile; 4] = [
    CropProfile {
        crop: "Rice (Ponni Variety)",
        suitability: 95,
        season: "Kharif",
        expected_yield: "4-5 tons/hectare",
        profitability: Level::High,
        water_requirement: "High (1200-1500mm)",
        fertilizers: &["Urea", "DAP", "Potash"],
        diseases: &["Brown leaf spot", "Blast"],
        market_demand: Level::High,
    },
    CropProfile {
        crop: "Black Pepper",
        suitability: 88,
        season: "Post-monsoon",
        expected_yield: "2-3 kg/vine",
        profitability: Level::High,
        water_requirement: "Medium (800-1000mm)",
        fertilizers: &["Organic compost", "NPK 20-20-20"],
        diseases: &["Quick wilt", "Foot rot"],
        market_demand: Level::High,
    },
    CropProfile {
        crop: "Coconut",
        suitability: 92,
        season: "Year-round",
        expected_yield: "80-100 nuts/palm/year",
        profitability: Level::Medium,
        water_requirement: "Medium (600-800mm)",
        fertilizers: &["Coconut mixture", "Organic manure"],
        diseases: &["Root wilt", "Leaf rot"],
        market_demand: Level::Medium,
    },
    CropProfile {
        crop: "Ginger",
        suitability: 85,
        season: "Pre-monsoon",
        expected_yield: "15-20 tons/hectare",
        profitability: Level::High,
        water_requirement: "High (1500-2000mm)",
        fertilizers: &["FYM", "NPK 60-60-40"],
        diseases: &["Bacterial wilt", "Rhizome rot"],
        market_demand: Level::High,
    },
];

/// Agro-climate conditions for a location
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgroConditions {
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub humidity: Option<f64>,
    /// Rainfall in mm
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub rainfall: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub season: Option<String>,
    /// Explicit condition tags such as `high_humidity`
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub conditions: Vec<String>,
}

impl AgroConditions {
    /// Condition tags, reported or derived from the measurements
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.conditions.iter().map(|c| c.to_lowercase()).collect();
        let mut derive = |tag: &str, applies: bool| {
            if applies && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        };
        derive("high_humidity", self.humidity.is_some_and(|h| h >= 80.0));
        derive("warm_temperature", self.temperature.is_some_and(|t| t >= 28.0));
        derive("dry_conditions", self.rainfall.is_some_and(|r| r < 50.0));
        derive("monsoon_season", self.season() == Some(Season::Monsoon));
        tags
    }

    pub fn season(&self) -> Option<Season> {
        self.season.as_deref().and_then(Season::parse)
    }
}

/// Soil profile for a location
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SoilProfile {
    #[serde(default, rename = "type", deserialize_with = "lenient::optional_text")]
    pub soil_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub ph: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub fertility: Option<String>,
}

/// Crop demand trends
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MarketTrends {
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub high_demand_crops: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub low_demand_crops: Vec<String>,
}

/// Inputs gathered for a recommendation
#[derive(Debug, Default)]
pub struct FarmingInputs {
    pub conditions: Option<AgroConditions>,
    pub soil: Option<SoilProfile>,
    pub trends: Option<MarketTrends>,
}

enum FarmingInput {
    Conditions(AgroConditions),
    Soil(SoilProfile),
    Trends(MarketTrends),
}

/// Scores the crop table against whatever inputs are available
pub fn score_crops(inputs: &FarmingInputs, season: Season) -> Vec<CropRecommendation> {
    let high_demand: Vec<String> = inputs
        .trends
        .as_ref()
        .map(|t| t.high_demand_crops.iter().map(|c| c.to_lowercase()).collect())
        .unwrap_or_default();
    let season_matches = inputs
        .conditions
        .as_ref()
        .and_then(AgroConditions::season)
        .is_some_and(|s| s == season);
    let unsuitable_ph = inputs
        .soil
        .as_ref()
        .and_then(|s| s.ph)
        .is_some_and(|ph| !SUITABLE_PH.contains(&ph));

    let mut recommendations: Vec<CropRecommendation> = CROPS
        .iter()
        .map(|profile| {
            let mut score = i32::from(profile.suitability);
            if high_demand.contains(&profile.market_name()) {
                score += HIGH_DEMAND_BONUS;
            }
            if season_matches {
                score += SEASON_MATCH_BONUS;
            }
            if unsuitable_ph {
                score -= UNSUITABLE_PH_PENALTY;
            }
            profile.recommend(score.clamp(0, 100) as u8)
        })
        .collect();

    recommendations.sort_by(|a, b| b.suitability.cmp(&a.suitability));
    recommendations
}

/// Recommendation served when no input could be fetched
pub fn fallback_recommendations() -> Vec<CropRecommendation> {
    vec![CROPS[0].recommend(CROPS[0].suitability)]
}

/// A pest or disease warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PestAlert {
    pub pest: String,
    pub severity: Level,
    pub affected_crops: Vec<String>,
    pub symptoms: Vec<String>,
    pub treatment: String,
    pub prevention: String,
    pub region: String,
    /// 0-100
    pub confidence: u8,
}

struct PestProfile {
    pest: &'static str,
    severity: Level,
    affected_crops: &'static [&'static str],
    symptoms: &'static [&'static str],
    treatment: &'static str,
    prevention: &'static str,
    confidence: u8,
    /// Condition tags under which the pest thrives
    conditions: &'static [&'static str],
}

impl PestProfile {
    fn alert(&self, region: &str) -> PestAlert {
        PestAlert {
            pest: self.pest.to_string(),
            severity: self.severity,
            affected_crops: self.affected_crops.iter().map(|s| s.to_string()).collect(),
            symptoms: self.symptoms.iter().map(|s| s.to_string()).collect(),
            treatment: self.treatment.to_string(),
            prevention: self.prevention.to_string(),
            region: region.to_string(),
            confidence: self.confidence,
        }
    }
}

const PESTS: [PestProfile; 3] = [
    PestProfile {
        pest: "Brown Plant Hopper",
        severity: Level::High,
        affected_crops: &["Rice"],
        symptoms: &["Yellowing leaves", "Stunted growth", "Hopper burn"],
        treatment: "Apply Imidacloprid 17.8% SL @ 0.3ml/lit or use yellow sticky traps",
        prevention: "Avoid excessive nitrogen fertilization, maintain proper spacing",
        confidence: 85,
        conditions: &["high_humidity", "warm_temperature"],
    },
    PestProfile {
        pest: "Coconut Rhinoceros Beetle",
        severity: Level::Medium,
        affected_crops: &["Coconut", "Date Palm"],
        symptoms: &["V-shaped cuts in fronds", "Boring holes in crown"],
        treatment: "Apply Chlorpyrifos dust or use pheromone traps",
        prevention: "Remove decaying organic matter, regular crown inspection",
        confidence: 78,
        conditions: &["monsoon_season"],
    },
    PestProfile {
        pest: "Spice Thrips",
        severity: Level::Medium,
        affected_crops: &["Black Pepper", "Cardamom"],
        symptoms: &["Silver streaks on leaves", "Distorted growth"],
        treatment: "Spray Spinosad 45% SC @ 0.3ml/lit",
        prevention: "Maintain proper humidity, regular monitoring",
        confidence: 72,
        conditions: &["dry_conditions"],
    },
];

/// Pest reports from surveillance feeds
#[derive(Debug, Default, Deserialize)]
struct PestReports {
    #[serde(default)]
    alerts: Vec<PestReport>,
}

#[derive(Debug, Deserialize)]
struct PestReport {
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pest: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    severity: Option<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    affected_crops: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    symptoms: Vec<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    treatment: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    prevention: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    confidence: Option<f64>,
}

impl PestReport {
    fn into_alert(self, region: &str) -> Option<PestAlert> {
        Some(PestAlert {
            pest: self.pest?,
            severity: self
                .severity
                .as_deref()
                .and_then(Level::parse)
                .unwrap_or(Level::Medium),
            affected_crops: self.affected_crops,
            symptoms: self.symptoms,
            treatment: self.treatment.unwrap_or_default(),
            prevention: self.prevention.unwrap_or_default(),
            region: region.to_string(),
            confidence: self.confidence.unwrap_or(50.0).clamp(0.0, 100.0).round() as u8,
        })
    }
}

enum PestInput {
    Reports(PestReports),
    Conditions(AgroConditions),
}

/// Matches the pest table against condition tags and merges reported pests
///
/// A reported pest replaces a table entry of the same name. Sorted by
/// confidence, highest first.
pub fn match_pests(tags: &[String], reported: Vec<PestAlert>, region: &str) -> Vec<PestAlert> {
    let mut alerts: Vec<PestAlert> = PESTS
        .iter()
        .filter(|p| p.conditions.iter().any(|c| tags.iter().any(|t| t == c)))
        .map(|p| p.alert(region))
        .collect();

    for report in reported {
        match alerts
            .iter_mut()
            .find(|a| a.pest.eq_ignore_ascii_case(&report.pest))
        {
            Some(existing) => *existing = report,
            None => alerts.push(report),
        }
    }

    alerts.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    alerts
}

/// Pest alert served when every surveillance source fails
pub fn fallback_pest_alerts() -> Vec<PestAlert> {
    vec![PestAlert {
        pest: "Brown Plant Hopper".to_string(),
        severity: Level::High,
        affected_crops: vec!["Rice".to_string()],
        symptoms: vec!["Yellowing leaves".to_string(), "Stunted growth".to_string()],
        treatment: "Apply Imidacloprid 17.8% SL".to_string(),
        prevention: "Avoid excessive nitrogen fertilization".to_string(),
        region: "Kerala".to_string(),
        confidence: 85,
    }]
}

/// Field coordinates for a soil analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Soil health analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilAnalysis {
    pub ph: f64,
    /// kg/ha
    pub nitrogen: f64,
    /// kg/ha
    pub phosphorus: f64,
    /// kg/ha
    pub potassium: f64,
    /// Percent
    pub organic_matter: f64,
    pub recommendation: String,
}

impl Default for SoilAnalysis {
    fn default() -> Self {
        Self {
            ph: 6.5,
            nitrogen: 180.0,
            phosphorus: 45.0,
            potassium: 320.0,
            organic_matter: 1.2,
            recommendation: "Soil health is moderate. Apply organic compost and maintain pH \
                             between 6.0-7.0 for optimal crop growth."
                .to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SoilAnalysisRequest {
    coordinates: Option<Coordinates>,
    depth: &'static str,
    analysis_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct SoilAnalysisResponse {
    #[serde(default, deserialize_with = "lenient::optional_number")]
    ph: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    nitrogen: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    phosphorus: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    potassium: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    organic_matter: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    recommendation: Option<String>,
}

impl From<SoilAnalysisResponse> for SoilAnalysis {
    /// Missing or zero readings take the regional defaults
    fn from(r: SoilAnalysisResponse) -> Self {
        let present = |v: Option<f64>, default: f64| v.filter(|v| *v > 0.0).unwrap_or(default);
        let defaults = SoilAnalysis::default();
        Self {
            ph: present(r.ph, defaults.ph),
            nitrogen: present(r.nitrogen, defaults.nitrogen),
            phosphorus: present(r.phosphorus, defaults.phosphorus),
            potassium: present(r.potassium, defaults.potassium),
            organic_matter: present(r.organic_matter, defaults.organic_matter),
            recommendation: r.recommendation.unwrap_or_else(|| {
                "Apply organic compost and maintain pH between 6.0-7.0".to_string()
            }),
        }
    }
}

/// Provider for farming advice
#[derive(Debug, Clone)]
pub struct FarmingProvider {
    ctx: FetchContext,
    config: FarmingConfig,
    cache: TimedCache<Vec<CropRecommendation>>,
}

impl FarmingProvider {
    pub fn new(ctx: FetchContext, config: FarmingConfig) -> Self {
        let cache = ctx.cache(config.ttl());
        Self { ctx, config, cache }
    }

    /// Cache key for one recommendation request
    pub fn cache_key(location: &str, soil_type: &str, season: Season) -> CacheKey {
        CacheKey::new(
            RECOMMENDATIONS_CACHE_DOMAIN,
            &[
                ("location", location),
                ("soil_type", soil_type),
                ("season", season.as_str()),
            ],
        )
    }

    /// Recommends crops for a location, soil type and season
    #[instrument(skip(self, options))]
    pub async fn crop_recommendations(
        &self,
        query: &CropQuery,
        options: FetchOptions,
    ) -> Provided<Vec<CropRecommendation>> {
        let location = query
            .location
            .as_deref()
            .unwrap_or(&self.config.default_location);
        let soil_type = query
            .soil_type
            .as_deref()
            .unwrap_or(&self.config.default_soil_type);
        let season = query
            .season
            .unwrap_or_else(|| current_season(self.ctx.now().month()));
        let key = Self::cache_key(location, soil_type, season);

        read_through(
            &self.cache,
            &key,
            options,
            || async {
                let sources = vec![
                    Source::new(
                        "conditions",
                        self.fetch_conditions(location)
                            .map(|r| r.map(FarmingInput::Conditions))
                            .boxed(),
                    ),
                    Source::new(
                        "soil",
                        self.fetch_soil_profile(location, soil_type)
                            .map(|r| r.map(FarmingInput::Soil))
                            .boxed(),
                    ),
                    Source::new(
                        "market_trends",
                        self.fetch_market_trends()
                            .map(|r| r.map(FarmingInput::Trends))
                            .boxed(),
                    ),
                ];
                all_settled(sources, self.ctx.timeout)
                    .await
                    .merge(|successes| {
                        let mut inputs = FarmingInputs::default();
                        for (_, input) in successes {
                            match input {
                                FarmingInput::Conditions(c) => inputs.conditions = Some(c),
                                FarmingInput::Soil(s) => inputs.soil = Some(s),
                                FarmingInput::Trends(t) => inputs.trends = Some(t),
                            }
                        }
                        Some(score_crops(&inputs, season))
                    })
            },
            fallback_recommendations,
        )
        .await
    }

    /// Current pest and disease alerts for a location, never cached
    #[instrument(skip(self))]
    pub async fn pest_alerts(&self, location: Option<&str>) -> Provided<Vec<PestAlert>> {
        let location = location.unwrap_or(&self.config.default_location);

        let sources = vec![
            Source::new(
                "icrisat",
                async move {
                    let url = location_url(&self.config.icrisat_url, location)?;
                    self.fetch_pest_reports(url).await.map(PestInput::Reports)
                }
                .boxed(),
            ),
            Source::new(
                "state_agri",
                self.fetch_pest_reports(self.config.state_agri_url.clone())
                    .map(|r| r.map(PestInput::Reports))
                    .boxed(),
            ),
            Source::new(
                "conditions",
                self.fetch_conditions(location)
                    .map(|r| r.map(PestInput::Conditions))
                    .boxed(),
            ),
        ];

        let result = all_settled(sources, self.ctx.timeout)
            .await
            .merge(|successes| {
                let mut tags = Vec::new();
                let mut reported = Vec::new();
                for (_, input) in successes {
                    match input {
                        PestInput::Conditions(c) => tags.extend(c.tags()),
                        PestInput::Reports(r) => reported.extend(
                            r.alerts.into_iter().filter_map(|a| a.into_alert(location)),
                        ),
                    }
                }
                Some(match_pests(&tags, reported, location))
            });

        Provided::uncached(result, fallback_pest_alerts, self.ctx.now())
    }

    /// Soil health analysis for a field, never cached
    #[instrument(skip(self))]
    pub async fn analyze_soil(&self, coordinates: Option<Coordinates>) -> Provided<SoilAnalysis> {
        let sources = vec![Source::new(
            "soil_health",
            self.fetch_soil_analysis(coordinates).boxed(),
        )];

        let result = all_settled(sources, self.ctx.timeout)
            .await
            .merge(|successes| successes.into_iter().next().map(|(_, analysis)| analysis));

        Provided::uncached(result, SoilAnalysis::default, self.ctx.now())
    }

    async fn fetch_conditions(&self, location: &str) -> Result<AgroConditions, FetchError> {
        let request = self
            .ctx
            .client
            .get(&self.config.conditions_url)
            .query(&[("location", location)]);
        send_json(request).await
    }

    async fn fetch_soil_profile(
        &self,
        location: &str,
        soil_type: &str,
    ) -> Result<SoilProfile, FetchError> {
        let request = self
            .ctx
            .client
            .get(&self.config.soil_url)
            .query(&[("location", location), ("soil_type", soil_type)]);
        send_json(request).await
    }

    async fn fetch_market_trends(&self) -> Result<MarketTrends, FetchError> {
        let request = self.ctx.client.get(&self.config.market_trends_url);
        send_json(request).await
    }

    async fn fetch_pest_reports(&self, url: impl IntoUrl) -> Result<PestReports, FetchError> {
        let request = self.ctx.client.get(url);
        send_json(request).await
    }

    async fn fetch_soil_analysis(
        &self,
        coordinates: Option<Coordinates>,
    ) -> Result<SoilAnalysis, FetchError> {
        let body = SoilAnalysisRequest {
            coordinates,
            depth: "0-15cm",
            analysis_type: "comprehensive",
        };
        let request = self.ctx.client.post(&self.config.soil_health_url).json(&body);
        let response: SoilAnalysisResponse = send_json(request).await?;
        Ok(response.into())
    }
}

/// Appends `location` to `base` as a single percent-encoded path segment
fn location_url(base: &str, location: &str) -> Result<Url, FetchError> {
    let mut url =
        Url::parse(base).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| FetchError::InvalidUrl(format!("{}: cannot have path segments", base)))?
        .pop_if_empty()
        .push(location);
    Ok(url)
}
