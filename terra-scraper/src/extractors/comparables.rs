//! Comparable sales
//!
//! Multi-record: one record per comparable row, all carrying the subject
//! property's ID as source ID.

use scraper::Html;

use super::html::{read_fields, require_container, required_source_id, selector, FieldSpec, FieldType};
use super::Extractor;
use crate::error::ScrapeError;
use crate::models::{ExtractionRecord, FieldValue, RecordKind, SectionKind};
use crate::navigator::RawContent;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("comp_property_id", FieldType::Text),
    FieldSpec::new("address", FieldType::Text),
    FieldSpec::new("sale_price", FieldType::Money),
    FieldSpec::new("sale_date", FieldType::Date),
    FieldSpec::new("distance_miles", FieldType::Decimal),
    FieldSpec::new("beds", FieldType::Integer),
    FieldSpec::new("baths", FieldType::Decimal),
    FieldSpec::new("living_area_sqft", FieldType::Integer),
];

pub struct ComparablesExtractor;

impl Extractor for ComparablesExtractor {
    fn section(&self) -> SectionKind {
        SectionKind::Comparables
    }

    fn fields(&self) -> &[FieldSpec] {
        FIELDS
    }

    fn extract(&self, raw: &RawContent) -> Result<Vec<ExtractionRecord>, ScrapeError> {
        let source_id = required_source_id(raw)?;
        let document = Html::parse_document(&raw.body);
        let table = require_container(&document, raw, ".comparables-table")?;
        let row_selector = selector("tbody tr")?;

        let mut records = Vec::new();
        for row in table.select(&row_selector) {
            let mut fields = read_fields(row, FIELDS)?;
            // Older pages carry the comparable's ID only as a row attribute
            if let Some(comp_id) = row.value().attr("data-comp-id") {
                if fields.get("comp_property_id").is_some_and(FieldValue::is_unknown) {
                    fields.insert(
                        "comp_property_id".to_string(),
                        FieldValue::Text(comp_id.trim().to_string()),
                    );
                }
            }
            if fields.values().all(FieldValue::is_unknown) {
                continue;
            }

            let mut record = ExtractionRecord::new(RecordKind::Comparable, source_id);
            record.fields = fields;
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::html::page;

    #[test]
    fn test_rows_become_records() {
        let body = r#"
            <table class="comparables-table">
              <thead><tr><th>Address</th></tr></thead>
              <tbody>
                <tr data-comp-id="777">
                  <td data-field="address">10 Oak Ave</td>
                  <td data-field="sale_price">$498,000</td>
                  <td data-field="distance_miles">0.4 mi</td>
                </tr>
                <tr>
                  <td data-field="comp_property_id">778</td>
                  <td data-field="address">14 Oak Ave</td>
                  <td data-field="sale_price">$505,500</td>
                </tr>
                <tr><td colspan="3">No more results</td></tr>
              </tbody>
            </table>"#;

        let records = ComparablesExtractor
            .extract(&page(SectionKind::Comparables, Some("123456"), body))
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source_id == "123456"));
        assert_eq!(
            records[0].field("comp_property_id"),
            Some(&FieldValue::Text("777".into()))
        );
        assert_eq!(records[0].field("distance_miles"), Some(&FieldValue::Decimal(0.4)));
        assert_eq!(records[1].field("sale_price"), Some(&FieldValue::Integer(505_500)));
    }

    #[test]
    fn test_missing_table_is_parse_error() {
        assert!(matches!(
            ComparablesExtractor.extract(&page(SectionKind::Comparables, Some("1"), "<p></p>")),
            Err(ScrapeError::Parse { .. })
        ));
    }
}
