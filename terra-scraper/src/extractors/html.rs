//! Markup helpers shared by the section extractors
//!
//! Portal pages tag every value with a `data-field` attribute. A
//! [`FieldSpec`] names the attribute value and how to normalize its text.

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

use crate::error::ScrapeError;
use crate::models::{FieldValue, SectionKind};
use crate::navigator::RawContent;

/// Placeholders the portal renders for absent values
const EMPTY_MARKERS: &[&str] = &["", "-", "--", "\u{2014}", "n/a", "na", "not available"];

/// Normalization applied to a field's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    /// `$1,250,000`, `$425K`, `$1.2M`
    Money,
    Integer,
    Decimal,
    /// `4.5%` becomes `Decimal(4.5)`
    Percent,
    /// `MM/DD/YYYY` or ISO, rendered as ISO text
    Date,
}

/// One named field in a record schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
}

impl FieldSpec {
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self { name, field_type }
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Config(format!("bad selector {}: {:?}", css, e)))
}

/// First element matching `css`, or a parse error quoting the page
pub(crate) fn require_container<'a>(
    document: &'a Html,
    raw: &RawContent,
    css: &str,
) -> Result<ElementRef<'a>, ScrapeError> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .next()
        .ok_or_else(|| ScrapeError::parse(raw.section, format!("{} not found", css), &raw.body))
}

/// Resource ID the page was fetched for; every section but reports has one
pub(crate) fn required_source_id(raw: &RawContent) -> Result<&str, ScrapeError> {
    raw.source_id
        .as_deref()
        .ok_or_else(|| ScrapeError::Config(format!("{} content has no source ID", raw.section)))
}

/// Read every field in `specs` below `element`; absent fields become `Unknown`
pub(crate) fn read_fields(
    element: ElementRef<'_>,
    specs: &[FieldSpec],
) -> Result<BTreeMap<String, FieldValue>, ScrapeError> {
    let mut fields = BTreeMap::new();
    for spec in specs {
        let sel = selector(&format!("[data-field=\"{}\"]", spec.name))?;
        let value = element
            .select(&sel)
            .next()
            .map(|el| normalize(&element_text(el), spec.field_type))
            .unwrap_or(FieldValue::Unknown);
        fields.insert(spec.name.to_string(), value);
    }
    Ok(fields)
}

/// Visible text with runs of whitespace collapsed
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert portal text into a typed value
pub fn normalize(raw: &str, field_type: FieldType) -> FieldValue {
    let text = raw.trim();
    if EMPTY_MARKERS.contains(&text.to_ascii_lowercase().as_str()) {
        return FieldValue::Unknown;
    }

    let value = match field_type {
        FieldType::Text => Some(FieldValue::Text(text.to_string())),
        FieldType::Money => parse_money(text),
        FieldType::Integer => numeric_token(text)
            .and_then(|n| n.parse::<f64>().ok())
            .filter(|n| n.fract() == 0.0)
            .map(|n| FieldValue::Integer(n as i64)),
        FieldType::Decimal => numeric_token(text)
            .and_then(|n| n.parse::<f64>().ok())
            .map(FieldValue::Decimal),
        FieldType::Percent => numeric_token(text.trim_end_matches('%'))
            .and_then(|n| n.parse::<f64>().ok())
            .map(FieldValue::Decimal),
        FieldType::Date => parse_date(text).map(FieldValue::Text),
    };

    value.unwrap_or(FieldValue::Unknown)
}

fn parse_money(text: &str) -> Option<FieldValue> {
    let lowered = text.to_ascii_lowercase();
    let multiplier = if lowered.ends_with('m') {
        1_000_000.0
    } else if lowered.ends_with('k') {
        1_000.0
    } else {
        1.0
    };
    let amount = numeric_token(&lowered)?.parse::<f64>().ok()? * multiplier;

    if amount.fract() == 0.0 {
        Some(FieldValue::Integer(amount as i64))
    } else {
        Some(FieldValue::Decimal(amount))
    }
}

/// First run of digits (with sign, decimal point and thousands separators)
fn numeric_token(text: &str) -> Option<String> {
    // A sign or point only starts a number when a digit follows it
    let start = text.char_indices().find_map(|(i, c)| {
        let starts = c.is_ascii_digit()
            || (matches!(c, '-' | '.')
                && text[i + 1..].starts_with(|n: char| n.is_ascii_digit()));
        starts.then_some(i)
    })?;
    let token: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .filter(|c| *c != ',')
        .collect();
    token.chars().any(|c| c.is_ascii_digit()).then_some(token)
}

fn parse_date(text: &str) -> Option<String> {
    ["%m/%d/%Y", "%Y-%m-%d", "%b %d, %Y", "%B %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Shorthand for extractor tests
#[cfg(test)]
pub(crate) fn page(section: SectionKind, source_id: Option<&str>, body: &str) -> RawContent {
    RawContent::html(section, source_id, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_normalization() {
        assert_eq!(normalize("$1,250,000", FieldType::Money), FieldValue::Integer(1_250_000));
        assert_eq!(normalize("$425K", FieldType::Money), FieldValue::Integer(425_000));
        assert_eq!(normalize("$1.2M", FieldType::Money), FieldValue::Integer(1_200_000));
        assert_eq!(normalize("$99.50", FieldType::Money), FieldValue::Decimal(99.5));
        assert_eq!(normalize("Call agent", FieldType::Money), FieldValue::Unknown);
        assert_eq!(
            normalize("Price - $500,000", FieldType::Money),
            FieldValue::Integer(500_000)
        );
        assert_eq!(normalize("-12 days", FieldType::Integer), FieldValue::Integer(-12));
    }

    #[test]
    fn test_percent_and_counts() {
        assert_eq!(normalize("4.5%", FieldType::Percent), FieldValue::Decimal(4.5));
        assert_eq!(normalize("1,850 sq ft", FieldType::Integer), FieldValue::Integer(1850));
        assert_eq!(normalize("2.5", FieldType::Integer), FieldValue::Unknown);
        assert_eq!(normalize("2.5 baths", FieldType::Decimal), FieldValue::Decimal(2.5));
    }

    #[test]
    fn test_placeholders_are_unknown() {
        assert_eq!(normalize("N/A", FieldType::Text), FieldValue::Unknown);
        assert_eq!(normalize(" \u{2014} ", FieldType::Money), FieldValue::Unknown);
    }

    #[test]
    fn test_dates_rendered_iso() {
        assert_eq!(
            normalize("03/15/2021", FieldType::Date),
            FieldValue::Text("2021-03-15".to_string())
        );
        assert_eq!(
            normalize("Mar 15, 2021", FieldType::Date),
            FieldValue::Text("2021-03-15".to_string())
        );
        assert_eq!(normalize("last spring", FieldType::Date), FieldValue::Unknown);
    }

    #[test]
    fn test_read_fields_fills_unknown() {
        let doc = Html::parse_fragment(
            r#"<div id="c"><span data-field="beds"> 3 </span></div>"#,
        );
        let root = doc.select(&selector("#c").unwrap()).next().unwrap();
        let fields = read_fields(
            root,
            &[
                FieldSpec::new("beds", FieldType::Integer),
                FieldSpec::new("baths", FieldType::Decimal),
            ],
        )
        .unwrap();
        assert_eq!(fields["beds"], FieldValue::Integer(3));
        assert_eq!(fields["baths"], FieldValue::Unknown);
    }
}
