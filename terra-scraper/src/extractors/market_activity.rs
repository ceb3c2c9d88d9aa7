//! Market activity by location or ZIP

use scraper::Html;

use super::html::{read_fields, require_container, required_source_id, FieldSpec, FieldType};
use super::Extractor;
use crate::error::ScrapeError;
use crate::models::{ExtractionRecord, RecordKind, SectionKind};
use crate::navigator::RawContent;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("area_name", FieldType::Text),
    FieldSpec::new("period", FieldType::Text),
    FieldSpec::new("median_list_price", FieldType::Money),
    FieldSpec::new("median_sale_price", FieldType::Money),
    FieldSpec::new("median_days_on_market", FieldType::Integer),
    FieldSpec::new("active_listings", FieldType::Integer),
    FieldSpec::new("new_listings", FieldType::Integer),
    FieldSpec::new("closed_sales", FieldType::Integer),
    FieldSpec::new("months_of_supply", FieldType::Decimal),
    FieldSpec::new("list_to_sale_ratio", FieldType::Percent),
];

pub struct MarketActivityExtractor;

impl Extractor for MarketActivityExtractor {
    fn section(&self) -> SectionKind {
        SectionKind::MarketActivity
    }

    fn fields(&self) -> &[FieldSpec] {
        FIELDS
    }

    fn extract(&self, raw: &RawContent) -> Result<Vec<ExtractionRecord>, ScrapeError> {
        let source_id = required_source_id(raw)?;
        let document = Html::parse_document(&raw.body);
        let panel = require_container(&document, raw, ".market-activity")?;

        let mut record = ExtractionRecord::new(RecordKind::MarketActivity, source_id);
        record.fields = read_fields(panel, FIELDS)?;
        Ok(vec![record])
    }
}
