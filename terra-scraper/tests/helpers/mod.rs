//! Shared test utilities
//!
//! [`FakePortal`] stands in for the NARRPR portal: pages are keyed by
//! `path?key=value`, responses can be scripted per attempt, and every login
//! and fetch is counted.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use terra_common::events::EventBus;
use tokio_util::sync::CancellationToken;

use terra_scraper::error::ScrapeError;
use terra_scraper::export::{ExportFormat, Exporter};
use terra_scraper::extractors::ExtractorRegistry;
use terra_scraper::models::Credentials;
use terra_scraper::navigator::SectionNavigator;
use terra_scraper::portal::{PortalClient, PortalRequest, PortalResponse};
use terra_scraper::services::JobOrchestrator;
use terra_scraper::session::{SessionManager, SessionTokens};
use terra_scraper::utils::RetryPolicy;

pub const USERNAME: &str = "agent@example.com";
pub const PASSWORD: &str = "correct-horse";

pub fn good_credentials() -> Credentials {
    Credentials::new(USERNAME, PASSWORD)
}

pub fn bad_credentials() -> Credentials {
    Credentials::new(USERNAME, "wrong")
}

/// Page key the fake portal routes on
pub fn key_for(request: &PortalRequest) -> String {
    let mut key = request.path.clone();
    for (i, (k, v)) in request.query.iter().enumerate() {
        key.push(if i == 0 { '?' } else { '&' });
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}

/// Scripted portal
#[derive(Default)]
pub struct FakePortal {
    /// Served once each, before falling back to `pages`
    scripted: Mutex<HashMap<String, VecDeque<PortalResponse>>>,
    pages: Mutex<HashMap<String, PortalResponse>>,
    hits: Mutex<HashMap<String, usize>>,
    /// Cancel a token when a key is fetched
    cancel_on: Mutex<HashMap<String, CancellationToken>>,
    login_attempts: AtomicUsize,
    logouts: AtomicUsize,
    /// Upcoming logins that fail with a transient error
    failing_logins: AtomicUsize,
    /// Upcoming fetches bounced to the sign-in page
    expiring_fetches: AtomicUsize,
    issued: AtomicUsize,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `key` on every fetch
    pub fn page(self, key: &str, response: PortalResponse) -> Self {
        self.pages.lock().unwrap().insert(key.to_string(), response);
        self
    }

    pub fn html(self, key: &str, body: impl Into<String>) -> Self {
        let response = PortalResponse::ok_html(key, body);
        self.page(key, response)
    }

    pub fn json(self, key: &str, body: impl Into<String>) -> Self {
        let response = PortalResponse::ok_json(key, body);
        self.page(key, response)
    }

    /// Serve `responses` in order for `key`, then fall back to the page
    pub fn script(self, key: &str, responses: Vec<PortalResponse>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(key.to_string(), responses.into());
        self
    }

    pub fn cancel_when_fetched(self, key: &str, token: CancellationToken) -> Self {
        self.cancel_on.lock().unwrap().insert(key.to_string(), token);
        self
    }

    pub fn fail_next_logins(self, n: usize) -> Self {
        self.failing_logins.store(n, Ordering::SeqCst);
        self
    }

    pub fn expire_next_fetches(&self, n: usize) {
        self.expiring_fetches.store(n, Ordering::SeqCst);
    }

    pub fn hits(&self, key: &str) -> usize {
        self.hits.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn login_attempts(&self) -> usize {
        self.login_attempts.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PortalClient for FakePortal {
    async fn login(&self, credentials: &Credentials) -> Result<SessionTokens, ScrapeError> {
        self.login_attempts.fetch_add(1, Ordering::SeqCst);

        if Self::take_one(&self.failing_logins) {
            return Err(ScrapeError::TransientNetwork("login returned 503".to_string()));
        }
        if credentials.username != USERNAME || credentials.password() != PASSWORD {
            return Err(ScrapeError::Authentication("login form rejected credentials".to_string()));
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let mut tokens = SessionTokens::new();
        tokens.set(".ASPXAUTH", format!("session-{}", n));
        Ok(tokens)
    }

    async fn get(
        &self,
        tokens: &SessionTokens,
        request: &PortalRequest,
    ) -> Result<PortalResponse, ScrapeError> {
        let key = key_for(request);
        *self.hits.lock().unwrap().entry(key.clone()).or_default() += 1;

        if let Some(token) = self.cancel_on.lock().unwrap().get(&key) {
            token.cancel();
        }

        if tokens.get(".ASPXAUTH").is_none() || Self::take_one(&self.expiring_fetches) {
            return Ok(PortalResponse::redirect(&key, "/SignIn?ReturnUrl=%2F"));
        }

        if let Some(queue) = self.scripted.lock().unwrap().get_mut(&key) {
            if let Some(response) = queue.pop_front() {
                return Ok(response);
            }
        }

        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| PortalResponse::status_only(&key, 404)))
    }

    async fn logout(&self, _tokens: &SessionTokens) -> Result<(), ScrapeError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Orchestrator wired to a fake portal, writing CSV into `export_dir`
pub fn build_orchestrator(portal: Arc<FakePortal>, export_dir: &Path) -> JobOrchestrator {
    let exporter = Exporter::new(export_dir, None).with_formats([ExportFormat::Csv]);
    orchestrator_with_exporter(portal, exporter)
}

pub fn orchestrator_with_exporter(portal: Arc<FakePortal>, exporter: Exporter) -> JobOrchestrator {
    let retry = RetryPolicy::immediate(3);
    let sessions = SessionManager::new(portal.clone(), retry.clone(), Duration::from_secs(1800))
        .with_request_timeout(Duration::from_secs(5));
    let navigator = SectionNavigator::new(portal, Duration::from_secs(5));

    JobOrchestrator::new(
        sessions,
        navigator,
        ExtractorRegistry::with_defaults(),
        exporter,
        retry,
        EventBus::new(100),
    )
}

pub const REPORTS_HTML: &str = r#"
<html><body>
  <table class="reports-table">
    <thead><tr><th>Title</th><th>Type</th></tr></thead>
    <tbody>
      <tr data-report-id="R-100">
        <td data-field="title">Seller's Report</td>
        <td data-field="report_type">Property</td>
        <td data-field="property_address">400 Lake St</td>
        <td data-field="created_date">01/04/2024</td>
        <td data-field="status">Ready</td>
      </tr>
      <tr data-report-id="R-101">
        <td data-field="title">Market Trends</td>
        <td data-field="report_type">Market</td>
        <td data-field="created_date">2024-02-11</td>
        <td data-field="status">Ready</td>
      </tr>
    </tbody>
  </table>
</body></html>"#;

pub fn property_html(address: &str) -> String {
    format!(
        r#"<html><body>
  <section class="property-details">
    <h1 data-field="address">{}</h1>
    <span data-field="city">Minneapolis</span>
    <span data-field="state">MN</span>
    <span data-field="zip">55401</span>
    <span data-field="beds">4</span>
    <span data-field="baths">2.5</span>
    <span data-field="living_area_sqft">2,140</span>
    <span data-field="year_built">1925</span>
    <span data-field="last_sale_price">$412,000</span>
    <span data-field="last_sale_date">06/30/2019</span>
  </section>
</body></html>"#,
        address
    )
}

pub const VALUATION_JSON: &str = r#"{
  "valuation": {
    "estimatedValue": 455000,
    "low": "$430,000",
    "high": "$480,000",
    "confidence": 0.82,
    "asOf": "2024-03-01"
  }
}"#;

pub const PERMISSION_HTML: &str =
    "<html><body><p>You do not have permission to view this property.</p></body></html>";
