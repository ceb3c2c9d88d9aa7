//! Section navigation
//!
//! Maps a (section, resource ID) pair onto the portal page that holds it,
//! fetches that page with the job's session cookies and classifies the
//! response. Content is returned unparsed.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::ScrapeError;
use crate::models::{IdKind, ResourceId, SectionKind};
use crate::portal::{is_login_location, PortalClient, PortalRequest, PortalResponse};
use crate::session::SessionTokens;

/// Page text the portal renders for records the account may not see
const PERMISSION_MARKERS: &[&str] = &[
    "you do not have permission",
    "not authorized to view",
    "this record is not available",
    "upgrade your subscription",
];

/// Page text of the sign-in form, served with 200 when a session lapses
const SIGN_IN_MARKERS: &[&str] = &["id=\"signinform\"", "please sign in to continue"];

/// How the body should be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Html,
    Json,
}

/// Unparsed section content
#[derive(Debug, Clone)]
pub struct RawContent {
    pub section: SectionKind,
    /// Resource ID the page was requested for; `None` for the reports listing
    pub source_id: Option<String>,
    pub url: String,
    pub content_kind: ContentKind,
    pub body: String,
}

impl RawContent {
    pub fn html(section: SectionKind, source_id: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            section,
            source_id: source_id.map(str::to_string),
            url: String::new(),
            content_kind: ContentKind::Html,
            body: body.into(),
        }
    }

    pub fn json(section: SectionKind, source_id: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            content_kind: ContentKind::Json,
            ..Self::html(section, source_id, body)
        }
    }
}

/// Resolves and fetches section pages
#[derive(Clone)]
pub struct SectionNavigator {
    portal: Arc<dyn PortalClient>,
    timeout: Duration,
}

impl SectionNavigator {
    pub fn new(portal: Arc<dyn PortalClient>, timeout: Duration) -> Self {
        Self { portal, timeout }
    }

    /// Portal request for a section; `target` is ignored for the reports listing
    pub fn resolve(
        section: SectionKind,
        target: Option<&ResourceId>,
    ) -> Result<PortalRequest, ScrapeError> {
        if section == SectionKind::Reports {
            return Ok(PortalRequest::new("/Reports"));
        }

        let target = target.ok_or_else(|| {
            ScrapeError::Config(format!("section {} requires a resource ID", section))
        })?;

        let request = match (section, target.kind) {
            (SectionKind::Property, IdKind::Property) => {
                PortalRequest::new("/Property/Details").with_query("propertyId", &target.value)
            }
            (SectionKind::Valuation, IdKind::Property) => {
                PortalRequest::new("/Property/Valuation").with_query("propertyId", &target.value)
            }
            (SectionKind::Comparables, IdKind::Property) => {
                PortalRequest::new("/Property/Comparables").with_query("propertyId", &target.value)
            }
            (SectionKind::MarketActivity, IdKind::Location) => {
                PortalRequest::new("/Market/Activity").with_query("locationId", &target.value)
            }
            (SectionKind::MarketActivity, IdKind::Zip) => {
                PortalRequest::new("/Market/Activity").with_query("zip", &target.value)
            }
            (SectionKind::Neighborhood, IdKind::Neighborhood) => {
                PortalRequest::new("/Neighborhood/Profile")
                    .with_query("neighborhoodId", &target.value)
            }
            (section, kind) => {
                return Err(ScrapeError::Config(format!(
                    "section {} cannot be addressed by a {} ID",
                    section,
                    kind.as_str()
                )))
            }
        };

        Ok(request)
    }

    /// Fetch one section page
    ///
    /// # Errors
    /// - `NotFound`: 404, empty body, or a permission-restricted page
    /// - `SessionExpired`: 401, or a bounce to the sign-in page
    /// - `TransientNetwork`: timeout, connection failure, 5xx or 429
    pub async fn fetch_section(
        &self,
        tokens: &SessionTokens,
        section: SectionKind,
        target: Option<&ResourceId>,
    ) -> Result<RawContent, ScrapeError> {
        let request = Self::resolve(section, target)?;
        let source_id = target
            .filter(|_| section.requires_id())
            .map(|t| t.value.clone());

        let response = tokio::time::timeout(self.timeout, self.portal.get(tokens, &request))
            .await
            .map_err(|_| {
                ScrapeError::TransientNetwork(format!(
                    "{} timed out after {}s",
                    request.path,
                    self.timeout.as_secs()
                ))
            })??;

        let not_found = || ScrapeError::NotFound {
            section,
            id: source_id.clone().unwrap_or_else(|| section.to_string()),
        };

        classify(&response).map_err(|kind| match kind {
            Rejection::NotFound => not_found(),
            Rejection::SessionExpired => ScrapeError::SessionExpired,
            Rejection::Transient => {
                ScrapeError::TransientNetwork(format!("{} returned {}", request.path, response.status))
            }
        })?;

        debug!(
            section = %section,
            source_id = ?source_id,
            bytes = response.body.len(),
            "Fetched section content"
        );

        Ok(RawContent {
            section,
            content_kind: content_kind(&response),
            source_id,
            url: response.url,
            body: response.body,
        })
    }
}

enum Rejection {
    NotFound,
    SessionExpired,
    Transient,
}

fn classify(response: &PortalResponse) -> Result<(), Rejection> {
    match response.status {
        200..=299 => {}
        300..=399 => {
            return match response.location.as_deref() {
                Some(location) if is_login_location(location) => Err(Rejection::SessionExpired),
                _ => Err(Rejection::NotFound),
            }
        }
        401 => return Err(Rejection::SessionExpired),
        429 | 500..=599 => return Err(Rejection::Transient),
        _ => return Err(Rejection::NotFound),
    }

    if response.body.trim().is_empty() {
        return Err(Rejection::NotFound);
    }

    let lowered = response.body.to_ascii_lowercase();
    if SIGN_IN_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Err(Rejection::SessionExpired);
    }
    if PERMISSION_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Err(Rejection::NotFound);
    }
    Ok(())
}

fn content_kind(response: &PortalResponse) -> ContentKind {
    let declared_json = response
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.contains("json"));
    let looks_json = matches!(response.body.trim_start().chars().next(), Some('{') | Some('['));
    if declared_json || (response.content_type.is_none() && looks_json) {
        ContentKind::Json
    } else {
        ContentKind::Html
    }
}
