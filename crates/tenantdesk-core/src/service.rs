//! Tenant operations bound to a session.
//!
//! Each operation asks the `TokenManager` for a valid token before touching
//! the API, so a stale token is never sent. `ServiceError::Auth` means the
//! session must log in again; `ServiceError::Api` is the upstream's answer,
//! passed through unchanged.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::api::{AdminFieldNegotiator, ApiError, TenantClient};
use crate::auth::{AuthError, TokenManager};
use crate::models::{filter_tenants, NewTenant, Tenant, TenantUpdate};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ServiceError {
    /// Whether the caller should send the user back to login
    pub fn requires_login(&self) -> bool {
        matches!(self, ServiceError::Auth(AuthError::AuthRequired))
    }
}

#[derive(Clone)]
pub struct TenantService {
    tokens: Arc<TokenManager>,
    client: TenantClient,
}

impl TenantService {
    pub fn new(tokens: Arc<TokenManager>, client: TenantClient) -> Self {
        Self { tokens, client }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    async fn token(&self, session_id: &str) -> Result<String, ServiceError> {
        let token = self.tokens.ensure_valid_token(session_id).await?;
        debug!(session_id, "Attaching session token");
        Ok(token)
    }

    pub async fn list_tenants(&self, session_id: &str) -> Result<Vec<Tenant>, ServiceError> {
        let token = self.token(session_id).await?;
        Ok(self.client.list_tenants(&token).await?)
    }

    /// List tenants whose visible fields contain `query`
    pub async fn search_tenants(
        &self,
        session_id: &str,
        query: &str,
    ) -> Result<Vec<Tenant>, ServiceError> {
        let tenants = self.list_tenants(session_id).await?;
        Ok(filter_tenants(&tenants, query).into_iter().cloned().collect())
    }

    pub async fn get_tenant(&self, session_id: &str, tenant_id: &str) -> Result<Tenant, ServiceError> {
        let token = self.token(session_id).await?;
        Ok(self.client.get_tenant(&token, tenant_id).await?)
    }

    pub async fn create_tenant(
        &self,
        session_id: &str,
        tenant: NewTenant,
    ) -> Result<Tenant, ServiceError> {
        let token = self.token(session_id).await?;
        Ok(self.client.create_tenant(&token, &tenant.cleaned()).await?)
    }

    pub async fn update_tenant(
        &self,
        session_id: &str,
        tenant_id: &str,
        update: &TenantUpdate,
    ) -> Result<Tenant, ServiceError> {
        let token = self.token(session_id).await?;
        Ok(AdminFieldNegotiator::new(&self.client)
            .update(&token, tenant_id, update)
            .await?)
    }

    pub async fn delete_tenant(&self, session_id: &str, tenant_id: &str) -> Result<(), ServiceError> {
        let token = self.token(session_id).await?;
        Ok(self.client.delete_tenant(&token, tenant_id).await?)
    }

    pub async fn delete_tenants(
        &self,
        session_id: &str,
        tenant_ids: &[String],
    ) -> Result<(), ServiceError> {
        let token = self.token(session_id).await?;
        Ok(self.client.delete_tenants(&token, tenant_ids).await?)
    }
}
