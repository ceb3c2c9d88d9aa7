//! Saved reports listing
//!
//! One record per `<tr data-report-id>` row; the report's own ID is the
//! record's source ID. An empty table yields no records.

use scraper::Html;

use super::html::{read_fields, require_container, selector, FieldSpec, FieldType};
use super::Extractor;
use crate::error::ScrapeError;
use crate::models::{ExtractionRecord, RecordKind, SectionKind};
use crate::navigator::RawContent;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("title", FieldType::Text),
    FieldSpec::new("report_type", FieldType::Text),
    FieldSpec::new("property_address", FieldType::Text),
    FieldSpec::new("created_date", FieldType::Date),
    FieldSpec::new("status", FieldType::Text),
];

pub struct ReportsExtractor;

impl Extractor for ReportsExtractor {
    fn section(&self) -> SectionKind {
        SectionKind::Reports
    }

    fn fields(&self) -> &[FieldSpec] {
        FIELDS
    }

    fn extract(&self, raw: &RawContent) -> Result<Vec<ExtractionRecord>, ScrapeError> {
        let document = Html::parse_document(&raw.body);
        let table = require_container(&document, raw, ".reports-table")?;
        let row_selector = selector("tbody tr[data-report-id]")?;

        let mut records = Vec::new();
        for row in table.select(&row_selector) {
            let report_id = row.value().attr("data-report-id").unwrap_or_default().trim();
            if report_id.is_empty() {
                continue;
            }
            let mut record = ExtractionRecord::new(RecordKind::Report, report_id);
            record.fields = read_fields(row, FIELDS)?;
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::html::page;
    use crate::models::FieldValue;

    const LISTING: &str = r#"
        <table class="reports-table">
          <tbody>
            <tr data-report-id="R-100">
              <td data-field="title">Seller's Report</td>
              <td data-field="report_type">Property</td>
              <td data-field="property_address">12 Elm St</td>
              <td data-field="created_date">01/04/2024</td>
              <td data-field="status">Ready</td>
            </tr>
            <tr data-report-id="R-101">
              <td data-field="title">Market Trends</td>
              <td data-field="report_type">Market</td>
              <td data-field="created_date">--</td>
            </tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_one_record_per_row() {
        let records = ReportsExtractor
            .extract(&page(SectionKind::Reports, None, LISTING))
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_id, "R-100");
        assert_eq!(records[0].kind, RecordKind::Report);
        assert_eq!(
            records[0].field("created_date"),
            Some(&FieldValue::Text("2024-01-04".into()))
        );
        assert_eq!(records[1].field("property_address"), Some(&FieldValue::Unknown));
        assert_eq!(records[1].field("created_date"), Some(&FieldValue::Unknown));
    }

    #[test]
    fn test_empty_table_yields_no_records() {
        let body = r#"<table class="reports-table"><tbody></tbody></table>"#;
        let records = ReportsExtractor
            .extract(&page(SectionKind::Reports, None, body))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_missing_table_is_parse_error() {
        let err = ReportsExtractor
            .extract(&page(SectionKind::Reports, None, "<div>Maintenance</div>"))
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Parse { section: SectionKind::Reports, .. }));
    }
}
