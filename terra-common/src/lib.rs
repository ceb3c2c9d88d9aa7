//! # TerraMiner Common Library
//!
//! Shared code for the TerraMiner scraper workspace:
//! - Error and result types
//! - Configuration loading and root folder resolution
//! - SQLite schema initialization
//! - Scrape progress events and the broadcast event bus

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
