//! JSON export of the tenant list.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::Tenant;

/// Pretty-printed JSON array of tenants, unknown fields included
pub fn export_json(tenants: &[Tenant]) -> Result<String> {
    serde_json::to_string_pretty(tenants).context("Failed to serialize tenants")
}

/// `all_tenants_<username>_<YYYYMMDD_HHMMSS>.json`
pub fn export_file_name(username: Option<&str>, now: DateTime<Utc>) -> String {
    let username: String = username
        .unwrap_or("user")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "all_tenants_{}_{}.json",
        username,
        now.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_export_file_name() {
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            export_file_name(Some("ops@acme.io"), now),
            "all_tenants_ops@acme.io_20250309_140507.json"
        );
        assert_eq!(
            export_file_name(None, now),
            "all_tenants_user_20250309_140507.json"
        );
        assert_eq!(
            export_file_name(Some("a/b c"), now),
            "all_tenants_a_b_c_20250309_140507.json"
        );
    }

    #[test]
    fn test_export_json_is_array() {
        let tenants: Vec<Tenant> =
            serde_json::from_str(r#"[{"id":1,"name":"Acme","tier":"gold"}]"#).unwrap();
        let json = export_json(&tenants).unwrap();
        let back: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back[0]["tier"], "gold");
        assert!(json.contains('\n'));
    }
}
