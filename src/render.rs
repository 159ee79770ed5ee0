//! Text and JSON output for command outcomes

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::Outcome;
use crate::data::{
    AlertKind, CropRecommendation, MarketAlert, MarketPrice, PestAlert, SoilAnalysis, Trend,
    WeatherReport,
};
use crate::fetch::{DataOrigin, Provided};

/// JSON document printed with `--json`
#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    origin: &'static str,
    updated_at: DateTime<Utc>,
    failed_sources: Vec<String>,
    data: &'a T,
}

impl<'a, T: Serialize> Envelope<'a, T> {
    fn new<U>(provided: &Provided<U>, data: &'a T) -> Self {
        Self {
            origin: provided.origin.label(),
            updated_at: provided.updated_at,
            failed_sources: failed_sources(&provided.origin),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
struct MarketView<'a> {
    prices: &'a [MarketPrice],
    alerts: &'a [MarketAlert],
}

fn failed_sources(origin: &DataOrigin) -> Vec<String> {
    match origin {
        DataOrigin::Cache => Vec::new(),
        DataOrigin::Network { failed } => failed.iter().map(|f| f.to_string()).collect(),
        DataOrigin::Fallback { failures } => failures.iter().map(|f| f.to_string()).collect(),
    }
}

/// Writes an outcome as pretty-printed JSON
pub fn write_json(out: &mut impl Write, outcome: &Outcome) -> io::Result<()> {
    match outcome {
        Outcome::Weather(p) => to_json(out, &Envelope::new(p, &p.data)),
        Outcome::Market { prices, alerts } => {
            let view = MarketView {
                prices: &prices.data,
                alerts,
            };
            to_json(out, &Envelope::new(prices, &view))
        }
        Outcome::Crops(p) => to_json(out, &Envelope::new(p, &p.data)),
        Outcome::Pests(p) => to_json(out, &Envelope::new(p, &p.data)),
        Outcome::Soil(p) => to_json(out, &Envelope::new(p, &p.data)),
    }
}

fn to_json(out: &mut impl Write, value: &impl Serialize) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

/// Writes an outcome as human-readable text
pub fn write_text(out: &mut impl Write, outcome: &Outcome, now: DateTime<Utc>) -> io::Result<()> {
    match outcome {
        Outcome::Weather(p) => {
            write_weather(out, &p.data)?;
            write_footer(out, p, now)
        }
        Outcome::Market { prices, alerts } => {
            write_prices(out, &prices.data)?;
            write_market_alerts(out, alerts)?;
            write_footer(out, prices, now)
        }
        Outcome::Crops(p) => {
            write_crops(out, &p.data)?;
            write_footer(out, p, now)
        }
        Outcome::Pests(p) => {
            write_pests(out, &p.data)?;
            write_footer(out, p, now)
        }
        Outcome::Soil(p) => {
            write_soil(out, &p.data)?;
            write_footer(out, p, now)
        }
    }
}

fn write_weather(out: &mut impl Write, report: &WeatherReport) -> io::Result<()> {
    let c = &report.current;
    writeln!(
        out,
        "{}, {}",
        report.location.name, report.location.region
    )?;
    writeln!(
        out,
        "{}  {:.0}\u{00B0}C (feels {:.0})  {}",
        c.condition.sky().symbol(),
        c.temp_c,
        c.feelslike_c,
        c.condition.text
    )?;
    writeln!(
        out,
        "Humidity {:.0}%  Wind {:.0} km/h {}  Visibility {:.0} km  Pressure {:.0} mb",
        c.humidity, c.wind_kph, c.wind_dir, c.vis_km, c.pressure_mb
    )?;
    writeln!(out, "UV {:.0} ({})", c.uv, uv_level_text(c.uv))?;

    if !report.forecast.is_empty() {
        writeln!(out)?;
        writeln!(out, "Forecast")?;
        for day in &report.forecast {
            writeln!(
                out,
                "  {:<12}{:<3}{:>4.0}\u{00B0} /{:>3.0}\u{00B0}  rain {:>3.0}%  {}",
                day.date.format("%a %d %b").to_string(),
                day.condition.sky().symbol(),
                day.max_temp_c,
                day.min_temp_c,
                day.chance_of_rain,
                day.condition.text
            )?;
        }
    }

    for alert in &report.alerts {
        writeln!(out)?;
        writeln!(out, "! {} [{}]", alert.headline, alert.severity)?;
        if !alert.description.is_empty() {
            writeln!(out, "  {}", alert.description)?;
        }
    }
    Ok(())
}

fn write_prices(out: &mut impl Write, prices: &[MarketPrice]) -> io::Result<()> {
    writeln!(
        out,
        "{:<24}{:>9}{:>11}{:>10}  {:<8}{}",
        "Commodity", "Today", "Change", "%", "Demand", "Quality"
    )?;
    for p in prices {
        writeln!(
            out,
            "{:<24}{:>9}{:>10}{}{:>9.2}%  {:<8}{}",
            p.commodity,
            format!("₹{}", p.today_price),
            format!("{:+}", p.change),
            trend_arrow(p.trend),
            p.change_percent,
            p.demand.as_str(),
            p.quality
        )?;
    }
    Ok(())
}

fn write_market_alerts(out: &mut impl Write, alerts: &[MarketAlert]) -> io::Result<()> {
    if alerts.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "Alerts")?;
    for alert in alerts {
        let marker = match alert.kind {
            AlertKind::Positive => "+",
            AlertKind::Warning => "!",
            AlertKind::Neutral => "-",
        };
        writeln!(out, "  {} {}: {}", marker, alert.commodity, alert.message)?;
    }
    Ok(())
}

fn write_crops(out: &mut impl Write, crops: &[CropRecommendation]) -> io::Result<()> {
    for (i, crop) in crops.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(out, "{} ({}% suitable)", crop.crop, crop.suitability)?;
        writeln!(
            out,
            "  Season: {}  Yield: {}  Water: {}",
            crop.season, crop.expected_yield, crop.water_requirement
        )?;
        writeln!(
            out,
            "  Profitability: {}  Market demand: {}",
            crop.profitability.as_str(),
            crop.market_demand.as_str()
        )?;
        writeln!(out, "  Fertilizers: {}", crop.fertilizers.join(", "))?;
        writeln!(out, "  Watch for: {}", crop.diseases.join(", "))?;
    }
    Ok(())
}

fn write_pests(out: &mut impl Write, alerts: &[PestAlert]) -> io::Result<()> {
    if alerts.is_empty() {
        return writeln!(out, "No pest alerts for current conditions.");
    }
    for (i, alert) in alerts.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(
            out,
            "{} [{} severity, {}% confidence] - {}",
            alert.pest,
            alert.severity.as_str(),
            alert.confidence,
            alert.region
        )?;
        writeln!(out, "  Affects: {}", alert.affected_crops.join(", "))?;
        if !alert.symptoms.is_empty() {
            writeln!(out, "  Symptoms: {}", alert.symptoms.join(", "))?;
        }
        writeln!(out, "  Treatment: {}", alert.treatment)?;
        writeln!(out, "  Prevention: {}", alert.prevention)?;
    }
    Ok(())
}

fn write_soil(out: &mut impl Write, soil: &SoilAnalysis) -> io::Result<()> {
    writeln!(out, "pH              {:.1}", soil.ph)?;
    writeln!(out, "Nitrogen        {:.0} kg/ha", soil.nitrogen)?;
    writeln!(out, "Phosphorus      {:.0} kg/ha", soil.phosphorus)?;
    writeln!(out, "Potassium       {:.0} kg/ha", soil.potassium)?;
    writeln!(out, "Organic matter  {:.1}%", soil.organic_matter)?;
    writeln!(out)?;
    writeln!(out, "{}", soil.recommendation)
}

fn write_footer<T>(out: &mut impl Write, provided: &Provided<T>, now: DateTime<Utc>) -> io::Result<()> {
    writeln!(out)?;
    let source = match &provided.origin {
        DataOrigin::Cache => "cached".to_string(),
        DataOrigin::Network { failed } if failed.is_empty() => "live".to_string(),
        DataOrigin::Network { failed } => format!("live, {} source(s) unavailable", failed.len()),
        DataOrigin::Fallback { .. } => "offline data, live sources unavailable".to_string(),
    };
    writeln!(
        out,
        "Source: {} │ Updated: {}",
        source,
        freshness_text(provided.updated_at, now)
    )
}

/// Relative age of data, e.g. "5m ago"
pub fn freshness_text(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - updated_at;
    let mins_ago = elapsed.num_minutes();
    if mins_ago < 1 {
        "just now".to_string()
    } else if mins_ago < 60 {
        format!("{}m ago", mins_ago)
    } else {
        format!("{}h ago", elapsed.num_hours())
    }
}

fn trend_arrow(trend: Trend) -> &'static str {
    match trend {
        Trend::Up => "↑",
        Trend::Down => "↓",
        Trend::Stable => "→",
    }
}

/// Returns the text description for a UV index value
fn uv_level_text(uv: f64) -> &'static str {
    match uv as u32 {
        0..=2 => "Low",
        3..=5 => "Moderate",
        6..=7 => "High",
        8..=10 => "Very High",
        _ => "Extreme",
    }
}
