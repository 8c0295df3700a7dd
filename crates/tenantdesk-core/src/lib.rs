//! tenantdesk core library.
//!
//! Session-scoped OAuth token lifecycle plus a client for the
//! tenant-management REST API.
//!
//! - `auth`: token records, stores, credentials, token endpoint, `TokenManager`
//! - `api`: `TenantClient` and admin-field negotiation for updates
//! - `models`: tenant records and create/update payloads
//! - `service`: `TenantService`, tenant operations that obtain a valid token first
//! - `config`: persisted user config and environment settings
//! - `export`: JSON export helpers

pub mod api;
pub mod auth;
pub mod config;
pub mod export;
pub mod models;
pub mod service;
pub mod utils;

pub use service::{ServiceError, TenantService};
