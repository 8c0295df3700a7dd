use thiserror::Error;

/// The only failure callers of the lifecycle manager see.
/// Callers translate it into "go back to the login page".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication required")]
    AuthRequired,
}

/// Why a request to the token endpoint failed.
#[derive(Error, Debug)]
pub enum TokenEndpointError {
    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Token endpoint rejected the credentials: {0}")]
    Rejected(reqwest::StatusCode),

    #[error("Rate limit exceeded. Please wait before trying again.")]
    RateLimited,

    #[error("Token endpoint unreachable: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// Internal refresh failure. Logged, then collapsed into `AuthError::AuthRequired`.
#[derive(Error, Debug)]
pub(crate) enum RefreshError {
    #[error("no token record for session")]
    MissingRecord,

    #[error(transparent)]
    Endpoint(#[from] TokenEndpointError),

    #[error("credential lookup failed: {0:#}")]
    Credentials(anyhow::Error),

    #[error("token store failed: {0:#}")]
    Store(anyhow::Error),
}

impl From<RefreshError> for AuthError {
    fn from(_: RefreshError) -> Self {
        AuthError::AuthRequired
    }
}

/// Why an interactive login failed.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error(transparent)]
    Endpoint(#[from] TokenEndpointError),

    #[error("Failed to save credentials: {0:#}")]
    Credentials(anyhow::Error),

    #[error("Failed to save session: {0:#}")]
    Store(anyhow::Error),
}
