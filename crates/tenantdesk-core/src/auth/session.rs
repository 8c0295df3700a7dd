use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before their real expiry.
/// Covers clock drift and requests already in flight.
pub const DEFAULT_GRACE_PERIOD_SECS: i64 = 5 * 60;

/// Tokens within this window of expiry are flagged in the UI.
pub const DEFAULT_WARNING_WINDOW_SECS: i64 = 30 * 60;

/// Username whose password the credential source holds.
/// The password itself is never part of a token record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialRef(pub String);

impl CredentialRef {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn username(&self) -> &str {
        &self.0
    }
}

/// The bearer token held for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub obtained_at: DateTime<Utc>,
    pub expires_in: i64,
    pub credentials_ref: CredentialRef,
}

impl TokenRecord {
    pub fn new(
        access_token: String,
        obtained_at: DateTime<Utc>,
        expires_in: i64,
        credentials_ref: CredentialRef,
    ) -> Self {
        Self {
            access_token,
            obtained_at,
            expires_in,
            credentials_ref,
        }
    }

    /// `obtained_at + expires_in`. A lifetime that does not fit a timestamp
    /// (only possible for a corrupt record) expires at `obtained_at`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| self.obtained_at.checked_add_signed(lifetime))
            .unwrap_or(self.obtained_at)
    }

    /// Seconds left before the hard expiry, clamped at zero (for display)
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at() - now).num_seconds().max(0)
    }

    pub fn classify(&self, now: DateTime<Utc>, policy: &LifecyclePolicy) -> HealthState {
        HealthState::classify(now, self.expires_at(), policy)
    }
}

/// Thresholds used to classify token health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub grace_period: Duration,
    pub warning_window: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::seconds(DEFAULT_GRACE_PERIOD_SECS),
            warning_window: Duration::seconds(DEFAULT_WARNING_WINDOW_SECS),
        }
    }
}

/// Remaining-lifetime classification of a session's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Valid,
    ExpiringSoon,
    Expired,
    Absent,
}

/// Traffic-light indicator shown next to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Green,
    Yellow,
    Red,
}

impl HealthState {
    /// Classify a token expiring at `expires_at` as seen at `now`.
    pub fn classify(
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        policy: &LifecyclePolicy,
    ) -> Self {
        // A grace period reaching past the earliest timestamp covers everything
        let refresh_after = match expires_at.checked_sub_signed(policy.grace_period) {
            Some(refresh_after) => refresh_after,
            None => return HealthState::Expired,
        };
        if now >= refresh_after {
            HealthState::Expired
        } else if expires_at.signed_duration_since(now) <= policy.warning_window {
            HealthState::ExpiringSoon
        } else {
            HealthState::Valid
        }
    }

    /// Whether a token in this state may be attached to an outbound call
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthState::Valid | HealthState::ExpiringSoon)
    }

    pub fn indicator(&self) -> Indicator {
        match self {
            HealthState::Valid => Indicator::Green,
            HealthState::ExpiringSoon => Indicator::Yellow,
            HealthState::Expired | HealthState::Absent => Indicator::Red,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthState::Valid => "valid",
            HealthState::ExpiringSoon => "expiring soon",
            HealthState::Expired => "expired",
            HealthState::Absent => "not logged in",
        }
    }
}

/// Token health snapshot for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TokenStatus {
    pub health: HealthState,
    pub indicator: Indicator,
    pub valid: bool,
    pub expires_in: Option<i64>,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub expires_at: Option<DateTime<Utc>>,
    pub username: Option<String>,
}

impl TokenStatus {
    pub fn absent() -> Self {
        Self {
            health: HealthState::Absent,
            indicator: Indicator::Red,
            valid: false,
            expires_in: None,
            expires_at: None,
            username: None,
        }
    }

    pub fn from_record(record: &TokenRecord, now: DateTime<Utc>, policy: &LifecyclePolicy) -> Self {
        let health = record.classify(now, policy);
        Self {
            health,
            indicator: health.indicator(),
            valid: health.is_usable(),
            expires_in: Some(record.seconds_until_expiry(now)),
            expires_at: Some(record.expires_at()),
            username: Some(record.credentials_ref.username().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should parse")
            .with_timezone(&Utc)
    }

    fn record(obtained_at: DateTime<Utc>, expires_in: i64) -> TokenRecord {
        TokenRecord::new(
            "tok".to_string(),
            obtained_at,
            expires_in,
            CredentialRef::new("ops@example.com"),
        )
    }

    #[test]
    fn test_expires_at_is_derived() {
        let r = record(t0(), 3600);
        assert_eq!(r.expires_at(), t0() + Duration::seconds(3600));
    }

    #[test]
    fn test_classify_thresholds() {
        let policy = LifecyclePolicy::default();
        let now = t0();

        assert_eq!(
            HealthState::classify(now, now + Duration::minutes(40), &policy),
            HealthState::Valid
        );
        assert_eq!(
            HealthState::classify(now, now + Duration::minutes(10), &policy),
            HealthState::ExpiringSoon
        );
        assert_eq!(
            HealthState::classify(now, now - Duration::seconds(1), &policy),
            HealthState::Expired
        );
        // Inside the grace period counts as expired
        assert_eq!(
            HealthState::classify(now, now + Duration::seconds(5), &policy),
            HealthState::Expired
        );
        assert_eq!(
            HealthState::classify(now, now + Duration::minutes(5), &policy),
            HealthState::Expired
        );
        // Exactly at the warning boundary
        assert_eq!(
            HealthState::classify(now, now + Duration::minutes(30), &policy),
            HealthState::ExpiringSoon
        );
    }

    #[test]
    fn test_oversized_lifetime_counts_as_expired() {
        let policy = LifecyclePolicy::default();
        for expires_in in [i64::MAX, i64::MIN, 9_300_000_000_000_000] {
            let r = record(t0(), expires_in);
            assert_eq!(r.expires_at(), t0());
            assert_eq!(r.classify(t0(), &policy), HealthState::Expired);

            let status = TokenStatus::from_record(&r, t0(), &policy);
            assert_eq!(status.expires_in, Some(0));
            assert!(!status.valid);
        }
    }

    #[test]
    fn test_extreme_policy_does_not_overflow() {
        let huge = Duration::try_days(100_000_000).expect("within TimeDelta range");
        let now = t0();

        let wide_grace = LifecyclePolicy {
            grace_period: huge,
            warning_window: Duration::minutes(30),
        };
        assert_eq!(
            HealthState::classify(now, now + Duration::hours(1), &wide_grace),
            HealthState::Expired
        );

        let wide_warning = LifecyclePolicy {
            grace_period: Duration::minutes(5),
            warning_window: huge,
        };
        assert_eq!(
            HealthState::classify(now, now + Duration::days(365), &wide_warning),
            HealthState::ExpiringSoon
        );
        assert_eq!(
            HealthState::classify(now, DateTime::<Utc>::MAX_UTC, &wide_warning),
            HealthState::ExpiringSoon
        );
        assert_eq!(
            HealthState::classify(now, DateTime::<Utc>::MIN_UTC, &LifecyclePolicy::default()),
            HealthState::Expired
        );
    }

    #[test]
    fn test_indicator_colors() {
        assert_eq!(HealthState::Valid.indicator(), Indicator::Green);
        assert_eq!(HealthState::ExpiringSoon.indicator(), Indicator::Yellow);
        assert_eq!(HealthState::Expired.indicator(), Indicator::Red);
        assert_eq!(HealthState::Absent.indicator(), Indicator::Red);
        assert!(HealthState::ExpiringSoon.is_usable());
        assert!(!HealthState::Expired.is_usable());
    }

    #[test]
    fn test_status_clamps_expires_in() {
        let policy = LifecyclePolicy::default();
        let r = record(t0(), 60);
        let status = TokenStatus::from_record(&r, t0() + Duration::seconds(120), &policy);
        assert_eq!(status.expires_in, Some(0));
        assert!(!status.valid);
        assert_eq!(status.username.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn test_record_serializes_without_password() {
        let json = serde_json::to_value(record(t0(), 3600)).expect("record serializes");
        assert_eq!(json["credentials_ref"], "ops@example.com");
        assert!(json.get("expires_at").is_none());
    }
}
