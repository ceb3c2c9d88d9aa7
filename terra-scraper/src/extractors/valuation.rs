//! Automated valuation
//!
//! The portal serves the valuation either as an HTML summary card or as a
//! JSON payload from its valuation endpoint. Both map onto the same schema.

use scraper::Html;
use serde_json::Value;

use super::html::{
    normalize, read_fields, require_container, required_source_id, FieldSpec, FieldType,
};
use super::Extractor;
use crate::error::ScrapeError;
use crate::models::{ExtractionRecord, FieldValue, RecordKind, SectionKind};
use crate::navigator::{ContentKind, RawContent};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("estimated_value", FieldType::Money),
    FieldSpec::new("value_low", FieldType::Money),
    FieldSpec::new("value_high", FieldType::Money),
    FieldSpec::new("confidence_score", FieldType::Decimal),
    FieldSpec::new("as_of_date", FieldType::Date),
];

/// JSON key for each schema field
const JSON_KEYS: &[(&str, &str)] = &[
    ("estimated_value", "estimatedValue"),
    ("value_low", "low"),
    ("value_high", "high"),
    ("confidence_score", "confidence"),
    ("as_of_date", "asOf"),
];

pub struct ValuationExtractor;

impl ValuationExtractor {
    fn extract_json(&self, raw: &RawContent, source_id: &str) -> Result<ExtractionRecord, ScrapeError> {
        let payload: Value = serde_json::from_str(&raw.body)
            .map_err(|e| ScrapeError::parse(raw.section, format!("invalid JSON: {}", e), &raw.body))?;
        let object = payload
            .get("valuation")
            .unwrap_or(&payload)
            .as_object()
            .ok_or_else(|| ScrapeError::parse(raw.section, "valuation object not found", &raw.body))?;

        let mut record = ExtractionRecord::new(RecordKind::Valuation, source_id);
        for spec in FIELDS {
            let key = JSON_KEYS
                .iter()
                .find(|(field, _)| *field == spec.name)
                .map(|(_, key)| *key)
                .unwrap_or(spec.name);
            let value = match object.get(key) {
                Some(Value::Number(n)) => normalize(&n.to_string(), spec.field_type),
                Some(Value::String(s)) => normalize(s, spec.field_type),
                _ => FieldValue::Unknown,
            };
            record.fields.insert(spec.name.to_string(), value);
        }
        Ok(record)
    }
}

impl Extractor for ValuationExtractor {
    fn section(&self) -> SectionKind {
        SectionKind::Valuation
    }

    fn fields(&self) -> &[FieldSpec] {
        FIELDS
    }

    fn extract(&self, raw: &RawContent) -> Result<Vec<ExtractionRecord>, ScrapeError> {
        let source_id = required_source_id(raw)?;

        if raw.content_kind == ContentKind::Json {
            return Ok(vec![self.extract_json(raw, source_id)?]);
        }

        let document = Html::parse_document(&raw.body);
        let summary = require_container(&document, raw, ".valuation-summary")?;
        let mut record = ExtractionRecord::new(RecordKind::Valuation, source_id);
        record.fields = read_fields(summary, FIELDS)?;
        Ok(vec![record])
    }
}
