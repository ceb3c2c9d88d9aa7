//! Utility modules for terra-scraper

pub mod retry;

pub use retry::{retry_on_lock, retry_with_backoff, RetryPolicy};
