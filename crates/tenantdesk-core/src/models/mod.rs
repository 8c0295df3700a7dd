//! Data models for tenant records.
//!
//! - `Tenant`: a tenant as returned by the API, unknown fields preserved
//! - `NewTenant`, `TenantUpdate`: create and update payloads
//! - `AdminDetail`, `AdminEntry`: additional tenant administrators

pub mod tenant;

pub use tenant::{
    filter_tenants, parse_admin_emails, AdminDetail, AdminEntry, NewTenant, Tenant, TenantFields,
    TenantId, TenantListResponse, TenantUpdate,
};
