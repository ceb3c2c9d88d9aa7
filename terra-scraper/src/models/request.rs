//! Scrape requests
//!
//! A [`ScrapeRequest`] is built once from form/API input and never changes
//! afterwards. Its work items are the ordered (section, id) pairs the
//! orchestrator processes.

use serde::{Deserialize, Serialize};
use terra_common::{Error, Result};

use super::credentials::Credentials;
use super::section::{IdKind, ResourceId, SectionKind};

/// Raw form fields from the run/advanced scraper pages
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrapeForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub scrape_reports: bool,
    /// Comma-separated
    pub property_ids: String,
    pub location_ids: String,
    pub zip_codes: String,
    pub neighborhood_ids: String,
    pub scrape_valuations: bool,
    pub scrape_comparables: bool,
    pub save_credentials: bool,
}

impl ScrapeForm {
    /// Credentials typed into the form, if both fields were filled in
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                let creds = Credentials::new(user.trim(), pass.as_str());
                creds.is_complete().then_some(creds)
            }
            _ => None,
        }
    }
}

/// Immutable description of what one job scrapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    sections: Vec<SectionKind>,
    property_ids: Vec<String>,
    location_ids: Vec<String>,
    zip_codes: Vec<String>,
    neighborhood_ids: Vec<String>,
}

/// One (section, id) pair of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub section: SectionKind,
    /// `None` only for the reports listing
    pub target: Option<ResourceId>,
}

impl WorkItem {
    pub fn source_id(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.value.as_str())
    }
}

impl ScrapeRequest {
    /// Request for the given sections, in the order given; duplicates are dropped
    pub fn new(sections: impl IntoIterator<Item = SectionKind>) -> Self {
        let mut unique = Vec::new();
        for section in sections {
            if !unique.contains(&section) {
                unique.push(section);
            }
        }
        Self {
            sections: unique,
            property_ids: Vec::new(),
            location_ids: Vec::new(),
            zip_codes: Vec::new(),
            neighborhood_ids: Vec::new(),
        }
    }

    pub fn with_property_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property_ids = normalize_ids(ids);
        self
    }

    pub fn with_location_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.location_ids = normalize_ids(ids);
        self
    }

    pub fn with_zip_codes<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.zip_codes = normalize_ids(ids);
        self
    }

    pub fn with_neighborhood_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.neighborhood_ids = normalize_ids(ids);
        self
    }

    /// Build a request from form fields
    ///
    /// Valuation and comparables are only requested when property IDs are
    /// present; market activity when location IDs or ZIP codes are.
    pub fn from_form(form: &ScrapeForm) -> Result<Self> {
        let property_ids = split_id_list(&form.property_ids);
        let location_ids = split_id_list(&form.location_ids);
        let zip_codes = split_id_list(&form.zip_codes);
        let neighborhood_ids = split_id_list(&form.neighborhood_ids);

        if let Some(bad) = zip_codes.iter().find(|z| !is_plausible_zip(z)) {
            return Err(Error::InvalidInput(format!("Invalid ZIP code: {}", bad)));
        }

        let mut sections = Vec::new();
        if form.scrape_reports {
            sections.push(SectionKind::Reports);
        }
        if !property_ids.is_empty() {
            sections.push(SectionKind::Property);
            if form.scrape_valuations {
                sections.push(SectionKind::Valuation);
            }
            if form.scrape_comparables {
                sections.push(SectionKind::Comparables);
            }
        } else if form.scrape_valuations || form.scrape_comparables {
            tracing::debug!("Valuation/comparables requested without property IDs, ignoring");
        }
        if !location_ids.is_empty() || !zip_codes.is_empty() {
            sections.push(SectionKind::MarketActivity);
        }
        if !neighborhood_ids.is_empty() {
            sections.push(SectionKind::Neighborhood);
        }

        if sections.is_empty() {
            return Err(Error::InvalidInput(
                "Nothing to scrape: select reports or enter at least one ID".to_string(),
            ));
        }

        Ok(Self::new(sections)
            .with_property_ids(property_ids)
            .with_location_ids(location_ids)
            .with_zip_codes(zip_codes)
            .with_neighborhood_ids(neighborhood_ids))
    }

    pub fn sections(&self) -> &[SectionKind] {
        &self.sections
    }

    pub fn property_ids(&self) -> &[String] {
        &self.property_ids
    }

    pub fn location_ids(&self) -> &[String] {
        &self.location_ids
    }

    pub fn zip_codes(&self) -> &[String] {
        &self.zip_codes
    }

    pub fn neighborhood_ids(&self) -> &[String] {
        &self.neighborhood_ids
    }

    pub fn ids(&self, kind: IdKind) -> &[String] {
        match kind {
            IdKind::Property => &self.property_ids,
            IdKind::Location => &self.location_ids,
            IdKind::Zip => &self.zip_codes,
            IdKind::Neighborhood => &self.neighborhood_ids,
        }
    }

    /// Work items for one section, IDs in submission order
    pub fn section_items(&self, section: SectionKind) -> Vec<WorkItem> {
        if !section.requires_id() {
            return vec![WorkItem {
                section,
                target: None,
            }];
        }

        section
            .id_kinds()
            .iter()
            .flat_map(|kind| {
                self.ids(*kind).iter().map(move |id| WorkItem {
                    section,
                    target: Some(ResourceId::new(*kind, id.clone())),
                })
            })
            .collect()
    }

    /// All work items: sections in request order, IDs in submission order
    pub fn work_items(&self) -> Vec<WorkItem> {
        self.sections
            .iter()
            .flat_map(|section| self.section_items(*section))
            .collect()
    }

    /// Whether `source_id` is a legal record source for `section`
    pub fn permits_source(&self, section: SectionKind, source_id: &str) -> bool {
        if !section.requires_id() {
            return true;
        }
        section
            .id_kinds()
            .iter()
            .any(|kind| self.ids(*kind).iter().any(|id| id == source_id))
    }
}

/// Split a comma-separated ID field: trimmed, blanks dropped, first occurrence kept
pub fn split_id_list(raw: &str) -> Vec<String> {
    normalize_ids(raw.split(|c| c == ',' || c == '\n' || c == ';'))
}

fn normalize_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        let id: String = id.into();
        let id = id.trim();
        if !id.is_empty() && !out.iter().any(|existing| existing == id) {
            out.push(id.to_string());
        }
    }
    out
}

/// Five digits, optionally followed by `-` and four digits
fn is_plausible_zip(zip: &str) -> bool {
    let (base, ext) = match zip.split_once('-') {
        Some((base, ext)) => (base, Some(ext)),
        None => (zip, None),
    };
    base.len() == 5
        && base.chars().all(|c| c.is_ascii_digit())
        && ext.map_or(true, |e| e.len() == 4 && e.chars().all(|c| c.is_ascii_digit()))
}
