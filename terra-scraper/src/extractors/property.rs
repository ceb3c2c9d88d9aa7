//! Property detail page

use scraper::Html;

use super::html::{read_fields, require_container, required_source_id, FieldSpec, FieldType};
use super::Extractor;
use crate::error::ScrapeError;
use crate::models::{ExtractionRecord, RecordKind, SectionKind};
use crate::navigator::RawContent;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("address", FieldType::Text),
    FieldSpec::new("city", FieldType::Text),
    FieldSpec::new("state", FieldType::Text),
    FieldSpec::new("zip", FieldType::Text),
    FieldSpec::new("property_type", FieldType::Text),
    FieldSpec::new("beds", FieldType::Integer),
    FieldSpec::new("baths", FieldType::Decimal),
    FieldSpec::new("living_area_sqft", FieldType::Integer),
    FieldSpec::new("lot_size_sqft", FieldType::Integer),
    FieldSpec::new("year_built", FieldType::Integer),
    FieldSpec::new("last_sale_price", FieldType::Money),
    FieldSpec::new("last_sale_date", FieldType::Date),
    FieldSpec::new("listing_status", FieldType::Text),
];

pub struct PropertyExtractor;

impl Extractor for PropertyExtractor {
    fn section(&self) -> SectionKind {
        SectionKind::Property
    }

    fn fields(&self) -> &[FieldSpec] {
        FIELDS
    }

    fn extract(&self, raw: &RawContent) -> Result<Vec<ExtractionRecord>, ScrapeError> {
        let source_id = required_source_id(raw)?;
        let document = Html::parse_document(&raw.body);
        let details = require_container(&document, raw, ".property-details")?;

        let mut record = ExtractionRecord::new(RecordKind::Property, source_id);
        record.fields = read_fields(details, FIELDS)?;
        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::html::page;
    use crate::models::FieldValue;

    #[test]
    fn test_property_fields_normalized() {
        let body = r#"
            <section class="property-details" data-property-id="123456">
              <h1 data-field="address">400 Lake St</h1>
              <span data-field="city">Minneapolis</span>
              <span data-field="beds">4</span>
              <span data-field="baths">2.5</span>
              <span data-field="living_area_sqft">2,140 sq ft</span>
              <span data-field="last_sale_price">$1,250,000</span>
              <span data-field="last_sale_date">06/30/2019</span>
            </section>"#;

        let records = PropertyExtractor
            .extract(&page(SectionKind::Property, Some("123456"), body))
            .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.source_id, "123456");
        assert_eq!(record.field("beds"), Some(&FieldValue::Integer(4)));
        assert_eq!(record.field("baths"), Some(&FieldValue::Decimal(2.5)));
        assert_eq!(record.field("living_area_sqft"), Some(&FieldValue::Integer(2140)));
        assert_eq!(record.field("last_sale_price"), Some(&FieldValue::Integer(1_250_000)));
        assert_eq!(record.field("year_built"), Some(&FieldValue::Unknown));
        assert_eq!(record.fields.len(), FIELDS.len());
    }

    #[test]
    fn test_missing_container_quotes_fragment() {
        let err = PropertyExtractor
            .extract(&page(SectionKind::Property, Some("1"), "<main>Redesigned page</main>"))
            .unwrap_err();
        match err {
            ScrapeError::Parse { fragment, .. } => assert!(fragment.contains("Redesigned")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_same_page_same_fields() {
        let body = r#"<div class="property-details"><b data-field="beds">3</b></div>"#;
        let raw = page(SectionKind::Property, Some("9"), body);
        let a = PropertyExtractor.extract(&raw).unwrap();
        let b = PropertyExtractor.extract(&raw).unwrap();
        assert!(a[0].same_content(&b[0]));
    }
}
