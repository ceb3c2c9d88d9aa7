//! Extraction records
//!
//! Every record is a kind tag plus a flat, ordered map of named fields.
//! Fields the page did not supply are kept as [`FieldValue::Unknown`] so a
//! record always carries the full schema of its kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::section::SectionKind;

/// Record variant, one per section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Report,
    Property,
    Valuation,
    Comparable,
    MarketActivity,
    Neighborhood,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Report,
        RecordKind::Property,
        RecordKind::Valuation,
        RecordKind::Comparable,
        RecordKind::MarketActivity,
        RecordKind::Neighborhood,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Report => "report",
            RecordKind::Property => "property",
            RecordKind::Valuation => "valuation",
            RecordKind::Comparable => "comparable",
            RecordKind::MarketActivity => "market_activity",
            RecordKind::Neighborhood => "neighborhood",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }

    pub fn section(&self) -> SectionKind {
        match self {
            RecordKind::Report => SectionKind::Reports,
            RecordKind::Property => SectionKind::Property,
            RecordKind::Valuation => SectionKind::Valuation,
            RecordKind::Comparable => SectionKind::Comparables,
            RecordKind::MarketActivity => SectionKind::MarketActivity,
            RecordKind::Neighborhood => SectionKind::Neighborhood,
        }
    }
}

impl From<SectionKind> for RecordKind {
    fn from(section: SectionKind) -> Self {
        match section {
            SectionKind::Reports => RecordKind::Report,
            SectionKind::Property => RecordKind::Property,
            SectionKind::Valuation => RecordKind::Valuation,
            SectionKind::Comparables => RecordKind::Comparable,
            SectionKind::MarketActivity => RecordKind::MarketActivity,
            SectionKind::Neighborhood => RecordKind::Neighborhood,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    /// Field absent or unparseable on the source page
    Unknown,
}

impl FieldValue {
    pub fn is_unknown(&self) -> bool {
        matches!(self, FieldValue::Unknown)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(n) => Some(*n as f64),
            FieldValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Rendering used for CSV cells; `Unknown` is an empty cell
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(n) => n.to_string(),
            FieldValue::Decimal(d) => d.to_string(),
            FieldValue::Unknown => String::new(),
        }
    }
}

/// One structured record extracted from a section page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub kind: RecordKind,
    /// Resource ID the page was fetched for (report ID for report listings)
    pub source_id: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionRecord {
    pub fn new(kind: RecordKind, source_id: impl Into<String>) -> Self {
        Self {
            kind,
            source_id: source_id.into(),
            fields: BTreeMap::new(),
            extracted_at: Utc::now(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Field-for-field equality ignoring `extracted_at`
    pub fn same_content(&self, other: &ExtractionRecord) -> bool {
        self.kind == other.kind && self.source_id == other.source_id && self.fields == other.fields
    }

    pub fn unknown_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, v)| v.is_unknown())
            .map(|(k, _)| k.as_str())
    }
}
