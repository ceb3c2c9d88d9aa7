//! Section extractors
//!
//! One [`Extractor`] per [`SectionKind`], looked up through the
//! [`ExtractorRegistry`] dispatch table. Extraction is synchronous and pure:
//! the same content always yields the same fields.
//!
//! A missing container element is a `Parse` error for that item only; a
//! missing field inside a present container is recorded as `Unknown`.

pub mod comparables;
pub mod html;
pub mod market_activity;
pub mod neighborhood;
pub mod property;
pub mod reports;
pub mod valuation;

pub use comparables::ComparablesExtractor;
pub use html::{normalize, FieldSpec, FieldType};
pub use market_activity::MarketActivityExtractor;
pub use neighborhood::NeighborhoodExtractor;
pub use property::PropertyExtractor;
pub use reports::ReportsExtractor;
pub use valuation::ValuationExtractor;

use std::collections::HashMap;

use crate::error::ScrapeError;
use crate::models::{ExtractionRecord, SectionKind};
use crate::navigator::RawContent;

/// Parses raw section content into records
pub trait Extractor: Send + Sync {
    /// Section this extractor handles
    fn section(&self) -> SectionKind;

    /// Field schema of the records it produces
    fn fields(&self) -> &[FieldSpec];

    fn extract(&self, raw: &RawContent) -> Result<Vec<ExtractionRecord>, ScrapeError>;
}

/// `SectionKind` → extractor dispatch table
pub struct ExtractorRegistry {
    extractors: HashMap<SectionKind, Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Empty table
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Table with the built-in extractor for every section
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ReportsExtractor));
        registry.register(Box::new(PropertyExtractor));
        registry.register(Box::new(ValuationExtractor));
        registry.register(Box::new(ComparablesExtractor));
        registry.register(Box::new(MarketActivityExtractor));
        registry.register(Box::new(NeighborhoodExtractor));
        registry
    }

    /// Add or replace the extractor for its section
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.insert(extractor.section(), extractor);
    }

    pub fn get(&self, section: SectionKind) -> Option<&dyn Extractor> {
        self.extractors.get(&section).map(|e| e.as_ref())
    }

    /// Dispatch on `raw.section`
    pub fn extract(&self, raw: &RawContent) -> Result<Vec<ExtractionRecord>, ScrapeError> {
        let extractor = self.get(raw.section).ok_or_else(|| {
            ScrapeError::Config(format!("no extractor registered for {}", raw.section))
        })?;

        let records = extractor.extract(raw)?;
        tracing::debug!(
            section = %raw.section,
            source_id = ?raw.source_id,
            records = records.len(),
            "Extracted section content"
        );
        Ok(records)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
