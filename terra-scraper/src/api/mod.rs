//! HTTP API handlers for terra-scraper
//!
//! REST endpoints for submitting and tracking scrape jobs, reading stored
//! records, plus an SSE stream of job progress.

pub mod health;
pub mod records;
pub mod scrape;
pub mod sse;

pub use health::health_routes;
pub use records::record_routes;
pub use scrape::scrape_routes;
pub use sse::scrape_event_stream;
