//! Neighborhood demographics

use scraper::Html;

use super::html::{read_fields, require_container, required_source_id, FieldSpec, FieldType};
use super::Extractor;
use crate::error::ScrapeError;
use crate::models::{ExtractionRecord, RecordKind, SectionKind};
use crate::navigator::RawContent;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", FieldType::Text),
    FieldSpec::new("population", FieldType::Integer),
    FieldSpec::new("median_household_income", FieldType::Money),
    FieldSpec::new("median_age", FieldType::Decimal),
    FieldSpec::new("owner_occupied_pct", FieldType::Percent),
    FieldSpec::new("renter_occupied_pct", FieldType::Percent),
    FieldSpec::new("median_home_value", FieldType::Money),
    FieldSpec::new("school_rating", FieldType::Decimal),
];

pub struct NeighborhoodExtractor;

impl Extractor for NeighborhoodExtractor {
    fn section(&self) -> SectionKind {
        SectionKind::Neighborhood
    }

    fn fields(&self) -> &[FieldSpec] {
        FIELDS
    }

    fn extract(&self, raw: &RawContent) -> Result<Vec<ExtractionRecord>, ScrapeError> {
        let source_id = required_source_id(raw)?;
        let document = Html::parse_document(&raw.body);
        let profile = require_container(&document, raw, ".neighborhood-profile")?;

        let mut record = ExtractionRecord::new(RecordKind::Neighborhood, source_id);
        record.fields = read_fields(profile, FIELDS)?;
        Ok(vec![record])
    }
}
