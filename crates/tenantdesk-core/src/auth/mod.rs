//! Authentication and token lifecycle.
//!
//! This module provides:
//! - `TokenRecord`: the bearer token bound to one session, with derived expiry
//! - `TokenStore`: keyed storage of records (in memory or encrypted on disk)
//! - `CredentialSource`: where refresh passwords live (OS keychain or memory)
//! - `TokenClient`: the OAuth2 client-credentials token endpoint
//! - `TokenManager`: hands out valid tokens, refreshing lazily and single-flight
//!
//! Tokens count as expired 5 minutes before their real expiry and are
//! flagged as expiring soon 30 minutes out.

pub mod clock;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{CredentialSource, KeyringCredentials, MemoryCredentials};
pub use endpoint::{IssuedToken, TokenClient};
pub(crate) use error::RefreshError;
pub use error::{AuthError, LoginError, TokenEndpointError};
pub use manager::TokenManager;
pub use session::{
    CredentialRef, HealthState, Indicator, LifecyclePolicy, TokenRecord, TokenStatus,
    DEFAULT_GRACE_PERIOD_SECS, DEFAULT_WARNING_WINDOW_SECS,
};
pub use store::{validate_session_id, FileTokenStore, MemoryTokenStore, TokenStore};
