//! krishi library
//!
//! Cached access to weather, commodity prices and crop advice for Kerala
//! farmers. Every provider follows the same cache-or-fetch-or-fallback
//! pipeline (see [`fetch`]), so callers always get data back.

pub mod app;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod fetch;
pub mod render;
