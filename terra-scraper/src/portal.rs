//! Portal HTTP access
//!
//! [`PortalClient`] is the seam between the scrape pipeline and the network.
//! [`HttpPortal`] talks to the real portal with `reqwest`; tests substitute a
//! scripted implementation.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION};
use reqwest::StatusCode;
use std::time::Duration;
use terra_common::config::PortalConfig;
use url::Url;

use crate::error::ScrapeError;
use crate::models::Credentials;
use crate::session::SessionTokens;

const SIGN_IN_PATH: &str = "/SignIn";
const SIGN_OUT_PATH: &str = "/SignOut";

/// Text the portal renders on a rejected login
const LOGIN_REJECTED_MARKERS: &[&str] = &[
    "invalid username or password",
    "sign in failed",
    "account is locked",
];

/// Path plus query parameters, relative to the portal origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl PortalRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Absolute URL under `base`
    pub fn to_url(&self, base: &Url) -> Result<Url, ScrapeError> {
        let mut url = base
            .join(&self.path)
            .map_err(|e| ScrapeError::Config(format!("bad portal path {}: {}", self.path, e)))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Query value by key
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Unparsed portal response
#[derive(Debug, Clone)]
pub struct PortalResponse {
    pub status: u16,
    pub url: String,
    /// Redirect target, when the portal answered with a 3xx
    pub location: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

impl PortalResponse {
    pub fn ok_html(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            url: url.into(),
            location: None,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.into(),
        }
    }

    pub fn ok_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            url: url.into(),
            location: None,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    pub fn status_only(url: impl Into<String>, status: u16) -> Self {
        Self {
            status,
            url: url.into(),
            location: None,
            content_type: None,
            body: String::new(),
        }
    }

    pub fn redirect(url: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            status: 302,
            url: url.into(),
            location: Some(location.into()),
            content_type: None,
            body: String::new(),
        }
    }
}

/// Network access to the portal
#[async_trait]
pub trait PortalClient: Send + Sync {
    /// Submit the login form; returns the session cookies on success
    async fn login(&self, credentials: &Credentials) -> Result<SessionTokens, ScrapeError>;

    /// Authenticated GET; status interpretation is left to the caller
    async fn get(
        &self,
        tokens: &SessionTokens,
        request: &PortalRequest,
    ) -> Result<PortalResponse, ScrapeError>;

    /// End the server-side session
    async fn logout(&self, tokens: &SessionTokens) -> Result<(), ScrapeError>;
}

/// `reqwest`-backed portal client
pub struct HttpPortal {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpPortal {
    pub fn new(config: &PortalConfig) -> Result<Self, ScrapeError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ScrapeError::Config(format!("invalid portal URL {}: {}", config.base_url, e)))?;

        // Redirects are inspected, not followed: a bounce to /SignIn means the session is gone
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ScrapeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl PortalClient for HttpPortal {
    async fn login(&self, credentials: &Credentials) -> Result<SessionTokens, ScrapeError> {
        let url = PortalRequest::new(SIGN_IN_PATH).to_url(&self.base_url)?;
        tracing::debug!(url = %url, username = %credentials.username, "Submitting portal login");

        let response = self
            .http
            .post(url)
            .form(&[
                ("UserName", credentials.username.as_str()),
                ("Password", credentials.password()),
                ("RememberMe", "false"),
            ])
            .send()
            .await?;

        let status = response.status();
        let location = header_string(response.headers(), LOCATION);
        let mut tokens = SessionTokens::new();
        tokens.absorb_set_cookie_headers(response.headers());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ScrapeError::Authentication(format!("login returned {}", status)));
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScrapeError::TransientNetwork(format!("login returned {}", status)));
        }

        let body = response.text().await.unwrap_or_default();
        let lowered = body.to_ascii_lowercase();
        if LOGIN_REJECTED_MARKERS.iter().any(|m| lowered.contains(m)) {
            return Err(ScrapeError::Authentication("login form rejected credentials".to_string()));
        }
        if location.as_deref().is_some_and(is_login_location) {
            return Err(ScrapeError::Authentication("redirected back to sign-in".to_string()));
        }
        if tokens.is_empty() {
            return Err(ScrapeError::Authentication("no session cookie issued".to_string()));
        }

        tracing::info!(
            username = %credentials.username,
            cookies = tokens.len(),
            "Portal login succeeded"
        );
        Ok(tokens)
    }

    async fn get(
        &self,
        tokens: &SessionTokens,
        request: &PortalRequest,
    ) -> Result<PortalResponse, ScrapeError> {
        let url = request.to_url(&self.base_url)?;
        tracing::debug!(url = %url, "Fetching portal page");

        let response = self
            .http
            .get(url.clone())
            .header(COOKIE, tokens.cookie_header())
            .send()
            .await?;

        let status = response.status().as_u16();
        let location = header_string(response.headers(), LOCATION);
        let content_type = header_string(response.headers(), CONTENT_TYPE);
        let body = response.text().await?;

        Ok(PortalResponse {
            status,
            url: url.to_string(),
            location,
            content_type,
            body,
        })
    }

    async fn logout(&self, tokens: &SessionTokens) -> Result<(), ScrapeError> {
        let url = PortalRequest::new(SIGN_OUT_PATH).to_url(&self.base_url)?;
        self.http
            .get(url)
            .header(COOKIE, tokens.cookie_header())
            .send()
            .await?;
        Ok(())
    }
}

/// Whether a redirect target is the portal's sign-in page
pub fn is_login_location(location: &str) -> bool {
    let lowered = location.to_ascii_lowercase();
    lowered.contains("/signin") || lowered.contains("/login")
}

fn header_string(
    headers: &reqwest::header::HeaderMap,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_with_query() {
        let base = Url::parse("https://www.narrpr.com").unwrap();
        let url = PortalRequest::new("/Property/Details")
            .with_query("propertyId", "123456")
            .to_url(&base)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.narrpr.com/Property/Details?propertyId=123456"
        );
    }

    #[test]
    fn test_query_values_are_encoded() {
        let base = Url::parse("https://www.narrpr.com/").unwrap();
        let url = PortalRequest::new("/Market/Activity")
            .with_query("locationId", "a b&c")
            .to_url(&base)
            .unwrap();
        assert_eq!(url.query(), Some("locationId=a+b%26c"));
    }

    #[test]
    fn test_login_location_detection() {
        assert!(is_login_location("/SignIn?ReturnUrl=%2FReports"));
        assert!(is_login_location("https://auth.example.com/login"));
        assert!(!is_login_location("/Reports"));
    }

    #[test]
    fn test_http_portal_rejects_bad_url() {
        let config = PortalConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(HttpPortal::new(&config), Err(ScrapeError::Config(_))));
    }
}
