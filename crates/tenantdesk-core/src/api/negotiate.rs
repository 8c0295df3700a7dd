//! Per-organization field negotiation for tenant updates.
//!
//! Some organization types reject `adminDetails` on update and only accept a
//! plain `adminEmails` list; others only accept `extraAdminEmails`. The
//! negotiator sends `adminDetails` first and steps down the list each time
//! the API answers 400.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::models::{Tenant, TenantUpdate};

use super::{ApiError, TenantClient};

const ADMIN_DETAILS_FIELD: &str = "adminDetails";

/// Representations of the extra-admin list, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminField {
    AdminDetails,
    AdminEmails,
    ExtraAdminEmails,
}

impl AdminField {
    pub fn field_name(&self) -> &'static str {
        match self {
            AdminField::AdminDetails => ADMIN_DETAILS_FIELD,
            AdminField::AdminEmails => "adminEmails",
            AdminField::ExtraAdminEmails => "extraAdminEmails",
        }
    }

    fn next(&self) -> Option<AdminField> {
        match self {
            AdminField::AdminDetails => Some(AdminField::AdminEmails),
            AdminField::AdminEmails => Some(AdminField::ExtraAdminEmails),
            AdminField::ExtraAdminEmails => None,
        }
    }
}

/// Build the update body carrying the admin list as `field`
pub fn update_payload(update: &TenantUpdate, field: AdminField) -> Result<Value, ApiError> {
    let mut body: Map<String, Value> = match serde_json::to_value(&update.fields) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            return Err(ApiError::InvalidResponse(
                "tenant update did not serialize to an object".to_string(),
            ))
        }
    };

    if let Some(admins) = &update.admin_details {
        let value = match field {
            AdminField::AdminDetails => serde_json::to_value(admins)
                .map_err(|e| ApiError::InvalidResponse(e.to_string()))?,
            AdminField::AdminEmails | AdminField::ExtraAdminEmails => Value::Array(
                admins
                    .iter()
                    .map(|a| Value::String(a.email.clone()))
                    .collect(),
            ),
        };
        // An empty plain-email list is omitted rather than sent
        let skip = field != AdminField::AdminDetails && admins.is_empty();
        if !skip {
            body.insert(field.field_name().to_string(), value);
        }
    }

    Ok(Value::Object(body))
}

/// Wraps `TenantClient` updates with admin-field fallback.
pub struct AdminFieldNegotiator<'a> {
    client: &'a TenantClient,
}

impl<'a> AdminFieldNegotiator<'a> {
    pub fn new(client: &'a TenantClient) -> Self {
        Self { client }
    }

    pub async fn update(
        &self,
        token: &str,
        tenant_id: &str,
        update: &TenantUpdate,
    ) -> Result<Tenant, ApiError> {
        let update = update.clone().cleaned();
        let mut field = AdminField::AdminDetails;

        loop {
            let payload = update_payload(&update, field)?;
            match self.client.put_tenant(token, tenant_id, &payload).await {
                Ok(tenant) => {
                    info!(tenant_id, field = field.field_name(), "Updated tenant");
                    return Ok(tenant);
                }
                Err(e) if Self::should_step_down(&e, field, &update) => {
                    let Some(next) = field.next() else {
                        return Err(e);
                    };
                    warn!(
                        tenant_id,
                        rejected = field.field_name(),
                        trying = next.field_name(),
                        "Admin field not supported for this organization"
                    );
                    field = next;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn should_step_down(error: &ApiError, field: AdminField, update: &TenantUpdate) -> bool {
        if update.admin_details.is_none() {
            return false;
        }
        match field {
            AdminField::AdminDetails => error.rejects_field(ADMIN_DETAILS_FIELD),
            AdminField::AdminEmails => matches!(error, ApiError::BadRequest(_)),
            AdminField::ExtraAdminEmails => false,
        }
    }
}
