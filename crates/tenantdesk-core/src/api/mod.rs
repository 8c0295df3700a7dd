//! REST API client module for the tenant-management API.
//!
//! This module provides the `TenantClient` for listing, fetching, creating,
//! updating and deleting tenants, and the `AdminFieldNegotiator` that retries
//! updates with the admin-list field the tenant's organization accepts.
//!
//! The API uses bearer tokens issued by the OAuth2 token endpoint; see
//! `crate::auth`.

pub mod client;
pub mod error;
pub mod negotiate;

pub use client::TenantClient;
pub use error::ApiError;
pub use negotiate::{update_payload, AdminField, AdminFieldNegotiator};
