//! Session-scoped token lifecycle.
//!
//! `TokenManager` hands out a currently-valid bearer token for a session, or
//! `AuthError::AuthRequired`. Refresh is lazy: a token is only renewed once it
//! falls inside the grace period, and at most one refresh per session is in
//! flight at any time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::{
    AuthError, Clock, CredentialRef, CredentialSource, HealthState, LifecyclePolicy, LoginError,
    RefreshError, SystemClock, TokenClient, TokenEndpointError, TokenRecord, TokenStatus,
    TokenStore,
};

type RefreshLock = Arc<tokio::sync::Mutex<()>>;

pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    credentials: Arc<dyn CredentialSource>,
    endpoint: TokenClient,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
    refresh_locks: Mutex<HashMap<String, RefreshLock>>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        credentials: Arc<dyn CredentialSource>,
        endpoint: TokenClient,
    ) -> Self {
        Self {
            store,
            credentials,
            endpoint,
            clock: Arc::new(SystemClock),
            policy: LifecyclePolicy::default(),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Authenticate with username and password and bind the token to a session.
    /// Replaces any record the session already had.
    pub async fn login(
        &self,
        session_id: &str,
        username: &str,
        password: &str,
    ) -> Result<TokenRecord, LoginError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(TokenEndpointError::MissingCredentials.into());
        }

        let issued = self.endpoint.request_token(username, password).await?;

        let credentials_ref = CredentialRef::new(username);
        self.credentials
            .store(&credentials_ref, password)
            .map_err(LoginError::Credentials)?;

        let record = TokenRecord::new(
            issued.access_token,
            self.clock.now(),
            issued.expires_in,
            credentials_ref,
        );

        let stored = {
            let lock = self.refresh_lock(session_id);
            let _guard = lock.lock().await;
            self.store.put(session_id, record.clone()).await
        };
        self.prune_lock(session_id);

        if let Err(e) = stored {
            // No session holds the password now
            if let Err(delete_err) = self.credentials.delete(&record.credentials_ref) {
                warn!(
                    session_id,
                    error = %delete_err,
                    "Failed to remove credentials after store failure"
                );
            }
            return Err(LoginError::Store(e));
        }

        info!(session_id, username, expires_in = record.expires_in, "Login successful");
        Ok(record)
    }

    /// Drop the session's token. Bound to logout.
    pub async fn logout(&self, session_id: &str) -> anyhow::Result<()> {
        let cleared = {
            let lock = self.refresh_lock(session_id);
            let _guard = lock.lock().await;
            self.store.clear(session_id).await
        };
        self.prune_lock(session_id);

        cleared?;
        info!(session_id, "Session cleared");
        Ok(())
    }

    /// Same as `logout`.
    pub async fn clear(&self, session_id: &str) -> anyhow::Result<()> {
        self.logout(session_id).await
    }

    /// Classify the session's token for the health indicator
    pub async fn classify(&self, session_id: &str) -> HealthState {
        match self.load(session_id).await {
            Some(record) => record.classify(self.clock.now(), &self.policy),
            None => HealthState::Absent,
        }
    }

    /// Token health plus the numbers the UI shows next to it
    pub async fn status(&self, session_id: &str) -> TokenStatus {
        match self.load(session_id).await {
            Some(record) => TokenStatus::from_record(&record, self.clock.now(), &self.policy),
            None => TokenStatus::absent(),
        }
    }

    /// Return a token that is safe to attach to an outbound call.
    ///
    /// Valid and expiring-soon tokens are returned unchanged. An expired token
    /// triggers exactly one refresh; if that fails the record is cleared and
    /// the caller must send the user back to login.
    pub async fn ensure_valid_token(&self, session_id: &str) -> Result<String, AuthError> {
        let record = self.load(session_id).await.ok_or_else(|| {
            debug!(session_id, "No token for session");
            AuthError::AuthRequired
        })?;

        if record.classify(self.clock.now(), &self.policy).is_usable() {
            return Ok(record.access_token);
        }

        let result = self.refresh_if_expired(session_id).await;
        self.prune_lock(session_id);
        result
    }

    /// Refresh regardless of the current classification.
    /// For tokens the API rejected despite a locally valid expiry.
    pub async fn force_refresh(&self, session_id: &str) -> Result<String, AuthError> {
        let result = {
            let lock = self.refresh_lock(session_id);
            let _guard = lock.lock().await;

            match self.load(session_id).await {
                Some(record) => self.refresh_locked(session_id, &record).await,
                None => {
                    warn!(session_id, error = %RefreshError::MissingRecord, "Refresh failed");
                    Err(AuthError::AuthRequired)
                }
            }
        };
        self.prune_lock(session_id);
        result
    }

    /// Take the session's refresh lock, then refresh unless another request
    /// already did (or gave up) while we waited.
    async fn refresh_if_expired(&self, session_id: &str) -> Result<String, AuthError> {
        let lock = self.refresh_lock(session_id);
        let _guard = lock.lock().await;

        let record = self
            .load(session_id)
            .await
            .ok_or(AuthError::AuthRequired)?;
        if record.classify(self.clock.now(), &self.policy).is_usable() {
            debug!(session_id, "Reusing token refreshed by a concurrent request");
            return Ok(record.access_token);
        }

        self.refresh_locked(session_id, &record).await
    }

    /// Caller must hold the session's refresh lock.
    async fn refresh_locked(
        &self,
        session_id: &str,
        current: &TokenRecord,
    ) -> Result<String, AuthError> {
        match self.request_replacement(session_id, current).await {
            Ok(record) => {
                info!(session_id, expires_in = record.expires_in, "Token refreshed");
                Ok(record.access_token)
            }
            Err(e) => {
                warn!(session_id, error = %e, "Token refresh failed, clearing session");
                if let Err(clear_err) = self.store.clear(session_id).await {
                    warn!(session_id, error = %clear_err, "Failed to clear session after refresh failure");
                }
                Err(e.into())
            }
        }
    }

    async fn request_replacement(
        &self,
        session_id: &str,
        current: &TokenRecord,
    ) -> Result<TokenRecord, RefreshError> {
        let credentials_ref = &current.credentials_ref;
        let password = self
            .credentials
            .get_password(credentials_ref)
            .map_err(RefreshError::Credentials)?;

        let issued = self
            .endpoint
            .request_token(credentials_ref.username(), &password)
            .await?;

        let record = TokenRecord::new(
            issued.access_token,
            self.clock.now(),
            issued.expires_in,
            credentials_ref.clone(),
        );
        self.store
            .put(session_id, record.clone())
            .await
            .map_err(RefreshError::Store)?;
        Ok(record)
    }

    async fn load(&self, session_id: &str) -> Option<TokenRecord> {
        match self.store.get(session_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to read session record");
                None
            }
        }
    }

    fn refresh_lock(&self, session_id: &str) -> RefreshLock {
        let mut locks = self.refresh_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the session's lock once no task holds or waits on it.
    /// Callers must have released their own clone first.
    fn prune_lock(&self, session_id: &str) {
        let mut locks = self.refresh_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.refresh_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::{ManualClock, MemoryCredentials, MemoryTokenStore};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        manager: TokenManager,
        store: Arc<MemoryTokenStore>,
        clock: Arc<ManualClock>,
    }

    async fn fixture(server: &MockServer) -> Fixture {
        let store = Arc::new(MemoryTokenStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let credentials = Arc::new(MemoryCredentials::new());
        credentials
            .store(&CredentialRef::new("ops"), "pw")
            .unwrap();
        let endpoint = TokenClient::new(format!("{}/token", server.uri()), true).unwrap();
        let manager = TokenManager::new(store.clone(), credentials, endpoint)
            .with_clock(clock.clone());
        Fixture {
            manager,
            store,
            clock,
        }
    }

    fn seeded(token: &str, obtained_at: DateTime<Utc>) -> TokenRecord {
        TokenRecord::new(token.to_string(), obtained_at, 3600, CredentialRef::new("ops"))
    }

    fn token_response(token: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(format!(
            r#"{{"access_token":"{}","expires_in":3600}}"#,
            token
        ))
    }

    #[tokio::test]
    async fn test_absent_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("never"))
            .expect(0)
            .mount(&server)
            .await;
        let f = fixture(&server).await;

        assert_eq!(f.manager.classify("s1").await, HealthState::Absent);
        assert_eq!(
            f.manager.ensure_valid_token("s1").await,
            Err(AuthError::AuthRequired)
        );
        assert_eq!(
            f.manager.force_refresh("s1").await,
            Err(AuthError::AuthRequired)
        );
        assert_eq!(f.manager.status("s1").await, TokenStatus::absent());
    }

    #[tokio::test]
    async fn test_valid_token_needs_no_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("new"))
            .expect(0)
            .mount(&server)
            .await;
        let f = fixture(&server).await;
        f.store.put("s1", seeded("old", t0())).await.unwrap();

        assert_eq!(f.manager.ensure_valid_token("s1").await.unwrap(), "old");
        assert_eq!(f.manager.ensure_valid_token("s1").await.unwrap(), "old");
    }

    #[tokio::test]
    async fn test_expiring_soon_is_not_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("new"))
            .expect(0)
            .mount(&server)
            .await;
        let f = fixture(&server).await;
        f.store.put("s1", seeded("old", t0())).await.unwrap();

        f.clock.set(t0() + Duration::seconds(1800));
        assert_eq!(f.manager.classify("s1").await, HealthState::ExpiringSoon);
        assert_eq!(f.manager.ensure_valid_token("s1").await.unwrap(), "old");
    }

    #[tokio::test]
    async fn test_refresh_inside_grace_period() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("new"))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server).await;
        f.store.put("s1", seeded("old", t0())).await.unwrap();

        let now = t0() + Duration::seconds(3595);
        f.clock.set(now);
        assert_eq!(f.manager.classify("s1").await, HealthState::Expired);
        assert_eq!(f.manager.ensure_valid_token("s1").await.unwrap(), "new");

        let record = f.store.get("s1").await.unwrap().unwrap();
        assert_eq!(record.obtained_at, now);
        assert_eq!(record.expires_at(), now + Duration::seconds(3600));
        assert_eq!(f.manager.classify("s1").await, HealthState::Valid);
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server).await;
        f.store.put("s1", seeded("old", t0())).await.unwrap();
        f.clock.set(t0() + Duration::hours(2));

        assert_eq!(
            f.manager.ensure_valid_token("s1").await,
            Err(AuthError::AuthRequired)
        );
        assert_eq!(f.manager.classify("s1").await, HealthState::Absent);
        assert_eq!(f.manager.lock_count(), 0);
        // No second attempt once the record is gone
        assert_eq!(
            f.manager.ensure_valid_token("s1").await,
            Err(AuthError::AuthRequired)
        );
        assert_eq!(f.manager.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_password_is_auth_required() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("new"))
            .expect(0)
            .mount(&server)
            .await;
        let f = fixture(&server).await;
        let stranger = TokenRecord::new(
            "old".to_string(),
            t0(),
            3600,
            CredentialRef::new("someone-else"),
        );
        f.store.put("s1", stranger).await.unwrap();

        assert_eq!(
            f.manager.force_refresh("s1").await,
            Err(AuthError::AuthRequired)
        );
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_force_refresh_replaces_valid_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("forced"))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server).await;
        f.store.put("s1", seeded("old", t0())).await.unwrap();

        assert_eq!(f.manager.force_refresh("s1").await.unwrap(), "forced");
        assert_eq!(f.manager.ensure_valid_token("s1").await.unwrap(), "forced");
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_login_then_logout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("fresh"))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server).await;

        let record = f.manager.login("s1", " ops ", "pw").await.unwrap();
        assert_eq!(record.credentials_ref.username(), "ops");
        assert_eq!(f.manager.classify("s1").await, HealthState::Valid);

        let status = f.manager.status("s1").await;
        assert!(status.valid);
        assert_eq!(status.expires_in, Some(3600));
        assert_eq!(status.username.as_deref(), Some("ops"));

        f.manager.logout("s1").await.unwrap();
        assert_eq!(f.manager.classify("s1").await, HealthState::Absent);
        assert_eq!(f.manager.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_login_rejects_oversized_lifetime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"access_token":"a","expires_in":9223372036854775807}"#,
            ))
            .mount(&server)
            .await;
        let f = fixture(&server).await;

        assert!(matches!(
            f.manager.login("s1", "ops", "pw").await,
            Err(LoginError::Endpoint(TokenEndpointError::Malformed(_)))
        ));
        assert!(f.store.is_empty().await);
        assert_eq!(f.manager.classify("s1").await, HealthState::Absent);
        assert_eq!(f.manager.status("s1").await, TokenStatus::absent());
    }

    #[tokio::test]
    async fn test_corrupt_lifetime_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("repaired"))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server).await;
        let corrupt =
            TokenRecord::new("old".to_string(), t0(), i64::MAX, CredentialRef::new("ops"));
        f.store.put("s1", corrupt).await.unwrap();

        assert_eq!(f.manager.classify("s1").await, HealthState::Expired);
        assert_eq!(f.manager.status("s1").await.expires_in, Some(0));
        assert_eq!(f.manager.ensure_valid_token("s1").await.unwrap(), "repaired");
        assert_eq!(f.manager.classify("s1").await, HealthState::Valid);
    }

    struct UnwritableStore;

    #[async_trait::async_trait]
    impl TokenStore for UnwritableStore {
        async fn get(&self, _session_id: &str) -> anyhow::Result<Option<TokenRecord>> {
            Ok(None)
        }

        async fn put(&self, _session_id: &str, _record: TokenRecord) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }

        async fn clear(&self, _session_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_login_store_failure_forgets_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("fresh"))
            .mount(&server)
            .await;
        let credentials = Arc::new(MemoryCredentials::new());
        let endpoint = TokenClient::new(format!("{}/token", server.uri()), true).unwrap();
        let manager = TokenManager::new(Arc::new(UnwritableStore), credentials.clone(), endpoint);

        assert!(matches!(
            manager.login("s1", "newbie", "pw").await,
            Err(LoginError::Store(_))
        ));
        assert!(credentials
            .get_password(&CredentialRef::new("newbie"))
            .is_err());
        assert_eq!(manager.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_login_rejects_blank_credentials() {
        let server = MockServer::start().await;
        let f = fixture(&server).await;
        assert!(matches!(
            f.manager.login("s1", "  ", "pw").await,
            Err(LoginError::Endpoint(TokenEndpointError::MissingCredentials))
        ));
        assert!(matches!(
            f.manager.login("s1", "ops", "").await,
            Err(LoginError::Endpoint(TokenEndpointError::MissingCredentials))
        ));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("new"))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server).await;
        f.store.put("stale", seeded("old", t0() - Duration::hours(2))).await.unwrap();
        f.store.put("fresh", seeded("current", t0())).await.unwrap();

        assert_eq!(f.manager.ensure_valid_token("fresh").await.unwrap(), "current");
        assert_eq!(f.manager.ensure_valid_token("stale").await.unwrap(), "new");
        assert_eq!(f.manager.ensure_valid_token("fresh").await.unwrap(), "current");
        assert_eq!(f.manager.lock_count(), 0);
    }
}
