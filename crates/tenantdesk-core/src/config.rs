//! Application configuration management.
//!
//! Two sources feed the console:
//! - `Config`: per-user state (last username, current session id) stored at
//!   `~/.config/tenantdesk/config.json`
//! - `Settings`: connection settings, token thresholds and tenant defaults
//!   read from the environment (a `.env` file is loaded by the binary)

use std::path::PathBuf;

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{LifecyclePolicy, DEFAULT_GRACE_PERIOD_SECS, DEFAULT_WARNING_WINDOW_SECS};
use crate::models::{parse_admin_emails, NewTenant, TenantFields};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tenantdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "https://api.sse.cisco.com/";
const DEFAULT_TOKEN_URL: &str = "https://api.sse.cisco.com/auth/v2/token";

/// Seat count suggested for new tenants when `SEATS` is unset
const DEFAULT_SEATS: i64 = 100;

const DEFAULT_COUNTRY_CODE: &str = "US";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub last_username: Option<String>,
    pub session_id: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Directory holding encrypted session records
    pub fn sessions_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("sessions"))
    }
}

/// Environment-driven settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub token_url: String,
    pub verify_ssl: bool,
    pub policy: LifecyclePolicy,
    pub tenant_defaults: NewTenant,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup (the process environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut base_url = get("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let verify_ssl = get("VERIFY_SSL")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let seconds = |key: &str, default: i64| match get(key) {
            Some(raw) => match raw
                .parse::<i64>()
                .ok()
                .filter(|secs| *secs >= 0)
                .and_then(Duration::try_seconds)
            {
                Some(duration) => duration,
                None => {
                    warn!(key, value = %raw, default, "Ignoring invalid duration setting");
                    Duration::seconds(default)
                }
            },
            None => Duration::seconds(default),
        };
        let policy = LifecyclePolicy {
            grace_period: seconds("TOKEN_GRACE_SECS", DEFAULT_GRACE_PERIOD_SECS),
            warning_window: seconds("TOKEN_WARNING_SECS", DEFAULT_WARNING_WINDOW_SECS),
        };

        let seats = match get("SEATS") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Ignoring non-numeric SEATS default");
                DEFAULT_SEATS
            }),
            None => DEFAULT_SEATS,
        };

        let tenant_defaults = NewTenant {
            fields: TenantFields {
                name: get("TENANT_NAME"),
                seats: Some(seats),
                comments: get("COMMENTS"),
                city: get("CITY"),
                state: get("STATE"),
                zip_code: get("ZIPCODE"),
                country_code: Some(
                    get("COUNTRY_CODE").unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
                ),
                address_line1: get("ADDRESS_LINE1"),
                address_line2: get("ADDRESS_LINE2"),
            },
            primary_admin_email: get("ADMIN_EMAIL"),
            primary_admin_first_name: get("ADMIN_FIRSTNAME"),
            primary_admin_last_name: get("ADMIN_LASTNAME"),
            admin_details: get("ADMIN_DETAILS")
                .map(|v| parse_admin_emails(&v))
                .unwrap_or_default(),
        };

        Self {
            base_url,
            token_url: get("TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            verify_ssl,
            policy,
            tenant_defaults,
        }
    }
}
