//! API client for the tenant-management REST API.
//!
//! Every method takes the bearer token explicitly. Callers obtain it from
//! `TokenManager::ensure_valid_token` (see `TenantService`).

use std::time::Duration;

use reqwest::{header, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{NewTenant, Tenant, TenantListResponse};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Collection endpoint for tenants
const TENANTS_PATH: &str = "/admin/v2/tenants";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Tenant API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct TenantClient {
    client: Client,
    base_url: String,
    initial_backoff: Duration,
}

impl TenantClient {
    pub fn new(base_url: &str, verify_ssl: bool) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!verify_ssl)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first rate-limit backoff (doubles on every retry)
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn tenant_url(&self, tenant_id: &str) -> Result<String, ApiError> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() || tenant_id.contains(['/', '?', '#']) {
            return Err(ApiError::NotFound(format!("invalid tenant id {:?}", tenant_id)));
        }
        Ok(self.url(&format!("{}/{}", TENANTS_PATH, tenant_id)))
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request with the bearer token, backing off on 429
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        token: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(token)
                .header(header::ACCEPT, "application/json");
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(
                        url,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    // ===== Tenant Operations =====

    /// Fetch all tenants
    pub async fn list_tenants(&self, token: &str) -> Result<Vec<Tenant>, ApiError> {
        let url = self.url(TENANTS_PATH);
        let response = self.send::<()>(Method::GET, &url, token, &[], None).await?;
        let tenants = Self::parse::<TenantListResponse>(response, &url)
            .await?
            .into_tenants();
        info!(count = tenants.len(), "Fetched tenants");
        Ok(tenants)
    }

    /// Fetch a single tenant
    pub async fn get_tenant(&self, token: &str, tenant_id: &str) -> Result<Tenant, ApiError> {
        let url = self.tenant_url(tenant_id)?;
        let response = self.send::<()>(Method::GET, &url, token, &[], None).await?;
        let tenant = Self::parse(response, &url).await?;
        debug!(tenant_id, "Fetched tenant");
        Ok(tenant)
    }

    /// Create a tenant, returning the record the API created
    pub async fn create_tenant(&self, token: &str, tenant: &NewTenant) -> Result<Tenant, ApiError> {
        let url = self.url(TENANTS_PATH);
        let response = self
            .send(Method::POST, &url, token, &[], Some(tenant))
            .await?;
        let created: Tenant = Self::parse(response, &url).await?;
        info!(tenant_id = %created.display_id(), "Created tenant");
        Ok(created)
    }

    /// Replace a tenant's editable fields with an already-built JSON payload.
    /// Prefer `AdminFieldNegotiator::update`, which handles per-org field support.
    pub async fn put_tenant(
        &self,
        token: &str,
        tenant_id: &str,
        payload: &serde_json::Value,
    ) -> Result<Tenant, ApiError> {
        let url = self.tenant_url(tenant_id)?;
        let response = self
            .send(Method::PUT, &url, token, &[], Some(payload))
            .await?;
        Self::parse(response, &url).await
    }

    /// Delete one or more tenants in a single request
    pub async fn delete_tenants(&self, token: &str, tenant_ids: &[String]) -> Result<(), ApiError> {
        let ids: Vec<&str> = tenant_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(ApiError::NotFound("no tenant ids given".to_string()));
        }

        let url = self.url(TENANTS_PATH);
        self.send::<()>(
            Method::DELETE,
            &url,
            token,
            &[("organizationIds", ids.join(","))],
            None,
        )
        .await?;
        info!(count = ids.len(), "Deleted tenants");
        Ok(())
    }

    pub async fn delete_tenant(&self, token: &str, tenant_id: &str) -> Result<(), ApiError> {
        self.delete_tenants(token, &[tenant_id.to_string()]).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::TenantFields;

    fn client_for(server: &MockServer) -> TenantClient {
        TenantClient::new(&format!("{}/", server.uri()), true)
            .unwrap()
            .with_backoff(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_list_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/v2/tenants"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"data":[{"id":1,"name":"Acme"},{"id":2,"name":"Globex"}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tenants = client_for(&server).list_tenants("tok-1").await.unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[1].display_name(), "Globex");
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/v2/tenants/7"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/v2/tenants/7"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":7}"#))
            .expect(1)
            .mount(&server)
            .await;

        let tenant = client_for(&server).get_tenant("tok", "7").await.unwrap();
        assert_eq!(tenant.display_id(), "7");
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(4)
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).list_tenants("tok").await,
            Err(ApiError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_create_posts_cleaned_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/v2/tenants"))
            .and(body_json(serde_json::json!({"name": "Acme", "seats": 25})))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_string(r#"{"organizationId":"org-9","name":"Acme","seats":25}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let payload = NewTenant {
            fields: TenantFields {
                name: Some("Acme".to_string()),
                seats: Some(25),
                comments: Some(String::new()),
                ..Default::default()
            },
            ..Default::default()
        }
        .cleaned();
        let created = client_for(&server).create_tenant("tok", &payload).await.unwrap();
        assert_eq!(created.display_id(), "org-9");
    }

    #[tokio::test]
    async fn test_delete_uses_organization_ids_query() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/admin/v2/tenants"))
            .and(query_param("organizationIds", "1,2,3"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let ids = vec!["1".to_string(), " 2 ".to_string(), "3".to_string(), "".to_string()];
        client_for(&server).delete_tenants("tok", &ids).await.unwrap();
    }

    #[tokio::test]
    async fn test_errors_propagate_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/v2/tenants/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such tenant"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/v2/tenants/revoked"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.get_tenant("tok", "missing").await,
            Err(ApiError::NotFound(m)) if m == "no such tenant"
        ));
        assert!(matches!(
            client.get_tenant("tok", "revoked").await,
            Err(ApiError::Unauthorized)
        ));
        assert!(client.get_tenant("tok", "../etc").await.is_err());
        assert!(client.delete_tenants("tok", &[]).await.is_err());
    }
}
