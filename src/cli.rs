//! Command-line interface parsing for krishi
//!
//! Global flags select the config file, cache directory, output format and
//! log verbosity; the subcommand selects the data domain.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;

use crate::data::{Coordinates, Season};
use crate::fetch::FetchOptions;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified season name is not recognized
    #[error("Invalid season: '{0}'. Valid seasons: monsoon, post-monsoon, pre-monsoon")]
    InvalidSeason(String),
}

/// krishi - Weather, market prices and crop advice for Kerala farmers
#[derive(Parser, Debug)]
#[command(name = "krishi")]
#[command(about = "Weather, market prices and crop advice for Kerala farmers")]
#[command(version)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for cached responses
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Ignore cached data and fetch fresh data
    #[arg(long, global = true)]
    pub refresh: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Current weather and forecast
    Weather {
        /// Location to query, e.g. "Thrissur, Kerala"
        #[arg(long)]
        location: Option<String>,
    },
    /// Commodity prices and price alerts
    Market {
        /// State to filter AGMARKNET prices by
        #[arg(long)]
        state: Option<String>,
    },
    /// Crop recommendations
    Crops {
        #[arg(long)]
        location: Option<String>,

        /// Soil type, e.g. alluvial, laterite
        #[arg(long)]
        soil: Option<String>,

        /// Growing season; defaults to the current one
        #[arg(long, value_parser = parse_season_arg)]
        season: Option<Season>,
    },
    /// Pest and disease alerts
    Pests {
        #[arg(long)]
        location: Option<String>,
    },
    /// Soil health analysis
    Soil {
        /// Field latitude
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Field longitude
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
    },
}

impl Command {
    /// Field coordinates, if both were given
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            Command::Soil {
                lat: Some(lat),
                lon: Some(lon),
            } => Some(Coordinates {
                lat: *lat,
                lon: *lon,
            }),
            _ => None,
        }
    }
}

impl Cli {
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            force_refresh: self.refresh,
        }
    }

    /// Default log filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "krishi=info",
            1 => "krishi=debug",
            _ => "krishi=trace",
        }
    }
}

/// Parses a season argument such as "post-monsoon"
pub fn parse_season_arg(s: &str) -> Result<Season, CliError> {
    Season::parse(s).ok_or_else(|| CliError::InvalidSeason(s.to_string()))
}
