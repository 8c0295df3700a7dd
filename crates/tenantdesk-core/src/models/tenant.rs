use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::utils::contains_ignore_case;

/// Tenant identifier. The API is inconsistent about numeric vs string ids,
/// so both are accepted and written back in their original form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(untagged)]
pub enum TenantId {
    Number(i64),
    Text(String),
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantId::Number(n) => write!(f, "{}", n),
            TenantId::Text(s) => write!(f, "{}", s),
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AdminDetail {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(rename = "firstName", default, deserialize_with = "null_as_empty")]
    pub first_name: String,
    #[serde(rename = "lastName", default, deserialize_with = "null_as_empty")]
    pub last_name: String,
}

impl AdminDetail {
    pub fn from_email(email: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }
}

/// An `adminDetails` entry: either a full object or a bare email string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(untagged)]
pub enum AdminEntry {
    Detail(AdminDetail),
    Email(String),
}

impl AdminEntry {
    pub fn email(&self) -> &str {
        match self {
            AdminEntry::Detail(d) => d.email.trim(),
            AdminEntry::Email(e) => e.trim(),
        }
    }
}

/// Tenant as returned by the API.
/// Fields this console does not know about are kept in `extra` so exports are lossless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<TenantId>,
    #[serde(rename = "organizationId", skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<TenantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "zipCode", skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(rename = "countryCode", skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(rename = "addressLine1", skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(rename = "addressLine2", skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(rename = "primaryAdminEmail", skip_serializing_if = "Option::is_none")]
    pub primary_admin_email: Option<String>,
    #[serde(rename = "adminDetails", skip_serializing_if = "Option::is_none")]
    pub admin_details: Option<Vec<AdminEntry>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Tenant {
    /// The id used in URLs: `id`, falling back to `organizationId`
    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.id.as_ref().or(self.organization_id.as_ref())
    }

    pub fn display_id(&self) -> String {
        self.tenant_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }

    pub fn admin_emails(&self) -> Vec<String> {
        self.admin_details
            .iter()
            .flatten()
            .map(|entry| entry.email())
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Admin emails as a comma-separated list
    pub fn admin_emails_display(&self) -> String {
        self.admin_emails().join(", ")
    }

    pub fn location_display(&self) -> String {
        [&self.city, &self.state, &self.country_code]
            .iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Case-insensitive match on the fields shown in the tenant list
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }
        let fields = [
            self.name.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.country_code.as_deref(),
            self.primary_admin_email.as_deref(),
        ];
        fields
            .iter()
            .flatten()
            .any(|field| contains_ignore_case(field, query))
            || contains_ignore_case(&self.display_id(), query)
            || self
                .admin_emails()
                .iter()
                .any(|email| contains_ignore_case(email, query))
    }
}

/// The list endpoint has answered with a bare array, `{"data": [...]}`
/// and `{"tenants": [...]}` depending on version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TenantListResponse {
    Bare(Vec<Tenant>),
    Data { data: Vec<Tenant> },
    Tenants { tenants: Vec<Tenant> },
    Other(serde_json::Map<String, serde_json::Value>),
}

impl TenantListResponse {
    pub fn into_tenants(self) -> Vec<Tenant> {
        match self {
            TenantListResponse::Bare(tenants)
            | TenantListResponse::Data { data: tenants }
            | TenantListResponse::Tenants { tenants } => tenants,
            TenantListResponse::Other(_) => {
                warn!("Tenant list response had no recognizable tenant array");
                Vec::new()
            }
        }
    }
}

/// Keep tenants matching `query`; an empty query keeps everything
pub fn filter_tenants<'a>(tenants: &'a [Tenant], query: &str) -> Vec<&'a Tenant> {
    tenants.iter().filter(|t| t.matches(query)).collect()
}

/// Editable address and plan fields shared by create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TenantFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "zipCode", skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(rename = "countryCode", skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(rename = "addressLine1", skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(rename = "addressLine2", skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TenantFields {
    /// Drop blank values so they are not sent to the API
    pub fn cleaned(self) -> Self {
        Self {
            name: non_empty(self.name),
            seats: self.seats.filter(|s| *s != 0),
            comments: non_empty(self.comments),
            city: non_empty(self.city),
            state: non_empty(self.state),
            zip_code: non_empty(self.zip_code),
            country_code: non_empty(self.country_code),
            address_line1: non_empty(self.address_line1),
            address_line2: non_empty(self.address_line2),
        }
    }
}

/// Create payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewTenant {
    #[serde(flatten)]
    pub fields: TenantFields,
    #[serde(rename = "primaryAdminEmail", skip_serializing_if = "Option::is_none")]
    pub primary_admin_email: Option<String>,
    #[serde(rename = "primaryAdminFirstName", skip_serializing_if = "Option::is_none")]
    pub primary_admin_first_name: Option<String>,
    #[serde(rename = "primaryAdminLastName", skip_serializing_if = "Option::is_none")]
    pub primary_admin_last_name: Option<String>,
    #[serde(rename = "adminDetails", skip_serializing_if = "Vec::is_empty")]
    pub admin_details: Vec<AdminDetail>,
}

impl NewTenant {
    pub fn cleaned(self) -> Self {
        Self {
            fields: self.fields.cleaned(),
            primary_admin_email: non_empty(self.primary_admin_email),
            primary_admin_first_name: non_empty(self.primary_admin_first_name),
            primary_admin_last_name: non_empty(self.primary_admin_last_name),
            admin_details: self
                .admin_details
                .into_iter()
                .filter(|a| !a.email.trim().is_empty())
                .collect(),
        }
    }
}

/// Update payload. Primary admin fields are never sent on update.
/// `admin_details: Some(vec![])` clears the extra admins; `None` leaves them alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TenantUpdate {
    #[serde(flatten)]
    pub fields: TenantFields,
    #[serde(rename = "adminDetails", skip_serializing_if = "Option::is_none")]
    pub admin_details: Option<Vec<AdminDetail>>,
}

impl TenantUpdate {
    /// Drop blank fields and a country code that is not exactly two characters
    pub fn cleaned(self) -> Self {
        let mut fields = self.fields.cleaned();
        if let Some(code) = fields.country_code.take() {
            if code.chars().count() == 2 {
                fields.country_code = Some(code);
            } else {
                warn!(
                    length = code.chars().count(),
                    "Dropping country code: must be exactly 2 characters"
                );
            }
        }

        Self {
            fields,
            admin_details: self.admin_details.map(|admins| {
                admins
                    .into_iter()
                    .filter(|a| !a.email.trim().is_empty())
                    .map(|a| AdminDetail {
                        email: a.email.trim().to_string(),
                        first_name: a.first_name.trim().to_string(),
                        last_name: a.last_name.trim().to_string(),
                    })
                    .collect()
            }),
        }
    }
}

/// Parse a comma-separated list of emails into admin entries
pub fn parse_admin_emails(input: &str) -> Vec<AdminDetail> {
    input
        .split(',')
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(AdminDetail::from_email)
        .collect()
}
