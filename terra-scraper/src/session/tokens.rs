//! Session cookies
//!
//! Cookies are kept as an explicit owned value instead of inside a shared
//! client cookie jar, so each job's session can be checked out, expired and
//! torn down independently.

use reqwest::header::{HeaderMap, SET_COOKIE};
use std::fmt;

/// Cookie set returned by a successful login
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    cookies: Vec<(String, String)>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cookie
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => self.cookies.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Merge every `Set-Cookie` header; cookies cleared by the server are removed
    pub fn absorb_set_cookie_headers(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            if let Some((name, value)) = parse_set_cookie(raw) {
                if value.is_empty() || raw.to_ascii_lowercase().contains("max-age=0") {
                    self.cookies.retain(|(n, _)| *n != name);
                } else {
                    self.set(name, value);
                }
            }
        }
    }

    /// `Cookie` request header value
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.cookies.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("SessionTokens").field("cookies", &names).finish()
    }
}

/// `name=value` from the first segment of a `Set-Cookie` header
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let first = raw.split(';').next()?;
    let (name, value) = first.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}
