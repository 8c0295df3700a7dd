//! Client for the OAuth2 token endpoint.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::TokenEndpointError;

/// HTTP timeout for token requests.
/// A hung token endpoint must not hang the request handler that triggered a refresh.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Lifetime assumed when the endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Longest lifetime accepted from the endpoint (one year)
const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// A freshly issued token, before it is bound to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: i64,
}

/// Requests bearer tokens with the client-credentials grant.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct TokenClient {
    client: Client,
    token_url: String,
}

impl TokenClient {
    pub fn new(token_url: impl Into<String>, verify_ssl: bool) -> Result<Self, TokenEndpointError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!verify_ssl)
            .build()?;

        Ok(Self {
            client,
            token_url: token_url.into(),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange a username and password for a bearer token
    pub async fn request_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IssuedToken, TokenEndpointError> {
        if username.is_empty() || password.is_empty() {
            return Err(TokenEndpointError::MissingCredentials);
        }

        debug!(url = %self.token_url, "Requesting token");
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(username, Some(password))
            .header(header::ACCEPT, "application/json")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(url = %self.token_url, "Token endpoint rate limited");
            return Err(TokenEndpointError::RateLimited);
        }
        if !status.is_success() {
            warn!(url = %self.token_url, %status, "Token endpoint rejected request");
            return Err(TokenEndpointError::Rejected(status));
        }

        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| TokenEndpointError::Malformed(e.to_string()))?;

        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TokenEndpointError::Malformed("missing access_token".to_string()))?;
        let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        if !(1..=MAX_EXPIRES_IN_SECS).contains(&expires_in) {
            return Err(TokenEndpointError::Malformed(format!(
                "expires_in out of range: {}",
                expires_in
            )));
        }

        info!(expires_in, "Token issued");
        Ok(IssuedToken {
            access_token,
            expires_in,
        })
    }
}
