//! Session cache and checkout
//!
//! One cache slot per credential fingerprint. A slot is guarded by an async
//! mutex; a job holds the slot's guard (inside a [`SessionLease`]) for its
//! whole run, so two jobs with the same credentials never share cookies
//! concurrently. Different credentials never contend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::{Session, SessionTokens};
use crate::error::ScrapeError;
use crate::models::{CredentialFingerprint, Credentials};
use crate::portal::PortalClient;
use crate::utils::{retry_with_backoff, RetryPolicy};

type Slot = Arc<Mutex<Option<Session>>>;

/// Process-wide session cache keyed by credential fingerprint
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    portal: Arc<dyn PortalClient>,
    retry: RetryPolicy,
    ttl: chrono::Duration,
    request_timeout: Duration,
    slots: Mutex<HashMap<CredentialFingerprint, Slot>>,
    logins: AtomicUsize,
}

impl SessionManager {
    pub fn new(portal: Arc<dyn PortalClient>, retry: RetryPolicy, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                portal,
                retry,
                ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(30)),
                request_timeout: Duration::from_secs(30),
                slots: Mutex::new(HashMap::new()),
                logins: AtomicUsize::new(0),
            }),
        }
    }

    /// Per-attempt bound on a login round trip
    pub fn with_request_timeout(self, timeout: Duration) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.request_timeout = timeout;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(shared) => Self { inner: shared },
        }
    }

    pub fn portal(&self) -> Arc<dyn PortalClient> {
        Arc::clone(&self.inner.portal)
    }

    /// Successful logins performed since startup
    pub fn login_count(&self) -> usize {
        self.inner.logins.load(Ordering::SeqCst)
    }

    /// Check out a valid session for `credentials`
    ///
    /// Waits while another job holds the session for the same credentials.
    /// A cached session still inside its validity window is reused; otherwise
    /// the manager logs in, retrying transient failures.
    pub async fn ensure_session(&self, credentials: &Credentials) -> Result<SessionLease, ScrapeError> {
        if !credentials.is_complete() {
            return Err(ScrapeError::Authentication(
                "username or password missing".to_string(),
            ));
        }

        let fingerprint = credentials.fingerprint();
        let slot = self.slot(&fingerprint).await;
        let mut guard = slot.lock_owned().await;

        let cached = guard.as_ref().filter(|s| s.is_valid()).cloned();
        let session = match cached {
            Some(existing) => {
                debug!(
                    fingerprint = %fingerprint,
                    session_id = %existing.session_id,
                    "Reusing cached portal session"
                );
                existing
            }
            None => {
                if guard.is_some() {
                    debug!(fingerprint = %fingerprint, "Cached portal session expired");
                }
                let fresh = self.login(credentials).await?;
                *guard = Some(fresh.clone());
                fresh
            }
        };

        Ok(SessionLease {
            manager: self.clone(),
            credentials: credentials.clone(),
            session,
            guard,
        })
    }

    /// Drop the cached session for `credentials` and end it on the portal
    pub async fn logout(&self, credentials: &Credentials) {
        let fingerprint = credentials.fingerprint();
        let slot = self.inner.slots.lock().await.remove(&fingerprint);
        if let Some(slot) = slot {
            let mut guard = slot.lock().await;
            if let Some(session) = guard.take() {
                self.end_session(&session).await;
            }
        }
    }

    /// Tear down every cached session
    pub async fn shutdown(&self) {
        let slots: Vec<Slot> = self.inner.slots.lock().await.drain().map(|(_, s)| s).collect();
        let mut ended = 0usize;
        for slot in slots {
            let mut guard = slot.lock().await;
            if let Some(session) = guard.take() {
                self.end_session(&session).await;
                ended += 1;
            }
        }
        info!(sessions = ended, "Session manager shut down");
    }

    async fn slot(&self, fingerprint: &CredentialFingerprint) -> Slot {
        let mut slots = self.inner.slots.lock().await;
        Arc::clone(
            slots
                .entry(fingerprint.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    async fn login(&self, credentials: &Credentials) -> Result<Session, ScrapeError> {
        let portal = &self.inner.portal;
        let timeout = self.inner.request_timeout;

        let tokens: SessionTokens = retry_with_backoff(
            "portal_login",
            &self.inner.retry,
            |e: &ScrapeError| matches!(e, ScrapeError::TransientNetwork(_)),
            || async move {
                match tokio::time::timeout(timeout, portal.login(credentials)).await {
                    Ok(result) => result,
                    Err(_) => Err(ScrapeError::TransientNetwork(format!(
                        "login timed out after {}s",
                        timeout.as_secs()
                    ))),
                }
            },
        )
        .await?;

        self.inner.logins.fetch_add(1, Ordering::SeqCst);
        let session = Session::new(
            credentials.fingerprint(),
            credentials.username.clone(),
            tokens,
            self.inner.ttl,
        );
        info!(
            username = %credentials.username,
            session_id = %session.session_id,
            expires_at = %session.expires_at,
            "Portal session established"
        );
        Ok(session)
    }

    async fn end_session(&self, session: &Session) {
        if let Err(e) = self.inner.portal.logout(&session.tokens).await {
            warn!(session_id = %session.session_id, error = %e, "Portal logout failed");
        } else {
            debug!(session_id = %session.session_id, "Portal session ended");
        }
    }
}

/// Exclusive checkout of one cached session
///
/// Dropping the lease returns the session to the cache.
pub struct SessionLease {
    manager: SessionManager,
    credentials: Credentials,
    session: Session,
    guard: OwnedMutexGuard<Option<Session>>,
}

impl SessionLease {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tokens(&self) -> &SessionTokens {
        &self.session.tokens
    }

    /// Re-login if the validity window has elapsed
    pub async fn ensure_valid(&mut self) -> Result<(), ScrapeError> {
        if self.session.is_valid() {
            return Ok(());
        }
        debug!(session_id = %self.session.session_id, "Session window elapsed, refreshing");
        self.reauthenticate().await
    }

    /// Replace the session after the portal reported it expired
    pub async fn reauthenticate(&mut self) -> Result<(), ScrapeError> {
        self.invalidate();
        let fresh = self.manager.login(&self.credentials).await?;
        *self.guard = Some(fresh.clone());
        self.session = fresh;
        Ok(())
    }

    /// Evict the session from the cache
    pub fn invalidate(&mut self) {
        if self.guard.take().is_some() {
            debug!(session_id = %self.session.session_id, "Portal session invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::{PortalRequest, PortalResponse};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Portal whose login fails transiently `fail_first` times
    struct CountingPortal {
        fail_first: u32,
        attempts: AtomicU32,
        reject: bool,
    }

    #[async_trait]
    impl PortalClient for CountingPortal {
        async fn login(&self, _credentials: &Credentials) -> Result<SessionTokens, ScrapeError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.reject {
                return Err(ScrapeError::Authentication("rejected".into()));
            }
            if n <= self.fail_first {
                return Err(ScrapeError::TransientNetwork("reset".into()));
            }
            let mut tokens = SessionTokens::new();
            tokens.set("auth", format!("t{}", n));
            Ok(tokens)
        }

        async fn get(
            &self,
            _tokens: &SessionTokens,
            request: &PortalRequest,
        ) -> Result<PortalResponse, ScrapeError> {
            Ok(PortalResponse::status_only(request.path.clone(), 404))
        }

        async fn logout(&self, _tokens: &SessionTokens) -> Result<(), ScrapeError> {
            Ok(())
        }
    }

    fn manager(fail_first: u32, reject: bool) -> (SessionManager, Arc<CountingPortal>) {
        let portal = Arc::new(CountingPortal {
            fail_first,
            attempts: AtomicU32::new(0),
            reject,
        });
        let manager = SessionManager::new(
            portal.clone(),
            RetryPolicy::immediate(3),
            Duration::from_secs(1800),
        );
        (manager, portal)
    }

    #[tokio::test]
    async fn test_session_reused_within_window() {
        let (manager, _) = manager(0, false);
        let creds = Credentials::new("agent", "pw");

        let first_id = manager.ensure_session(&creds).await.unwrap().session().session_id;
        let second_id = manager.ensure_session(&creds).await.unwrap().session().session_id;

        assert_eq!(first_id, second_id);
        assert_eq!(manager.login_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_login_failures_retried() {
        let (manager, portal) = manager(2, false);
        let creds = Credentials::new("agent", "pw");

        let lease = manager.ensure_session(&creds).await.unwrap();
        assert_eq!(lease.tokens().get("auth"), Some("t3"));
        assert_eq!(portal.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejected_login_not_retried() {
        let (manager, portal) = manager(0, true);
        let creds = Credentials::new("agent", "bad");

        let err = manager.ensure_session(&creds).await.err().unwrap();
        assert!(matches!(err, ScrapeError::Authentication(_)));
        assert_eq!(portal.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.login_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_password_is_authentication_error() {
        let (manager, portal) = manager(0, false);
        let err = manager
            .ensure_session(&Credentials::new("agent", ""))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ScrapeError::Authentication(_)));
        assert_eq!(portal.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reauthenticate_replaces_cached_session() {
        let (manager, _) = manager(0, false);
        let creds = Credentials::new("agent", "pw");

        let mut lease = manager.ensure_session(&creds).await.unwrap();
        let before = lease.session().session_id;
        lease.reauthenticate().await.unwrap();
        let after = lease.session().session_id;
        drop(lease);

        assert_ne!(before, after);
        let cached = manager.ensure_session(&creds).await.unwrap();
        assert_eq!(cached.session().session_id, after);
        assert_eq!(manager.login_count(), 2);
    }

    #[tokio::test]
    async fn test_logout_forces_fresh_login() {
        let (manager, _) = manager(0, false);
        let creds = Credentials::new("agent", "pw");

        drop(manager.ensure_session(&creds).await.unwrap());
        manager.logout(&creds).await;
        drop(manager.ensure_session(&creds).await.unwrap());

        assert_eq!(manager.login_count(), 2);
    }
}
