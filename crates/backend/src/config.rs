//! Backend client configuration.

use std::time::Duration;

/// Default total request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of attempts for a single API request.
pub const DEFAULT_MAX_REQUEST_RETRIES: u32 = 3;

/// Default number of login attempts after a token expiry.
pub const DEFAULT_MAX_LOGIN_RETRIES: u32 = 3;

/// Configuration for [`crate::ApiClient`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Account (email) used for login.
    pub account: String,
    /// Password used for login.
    pub password: String,
    /// Total timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// Connection timeout for a single HTTP request.
    pub connect_timeout: Duration,
    /// Attempts for a single API request before giving up.
    pub max_request_retries: u32,
    /// Login attempts after a token expiry before giving up.
    pub max_login_retries: u32,
    /// Base for the exponential retry backoff (`1 << attempt` of this unit).
    pub retry_backoff_unit: Duration,
}

impl BackendConfig {
    /// Create a configuration with default timeouts and retry limits.
    pub fn new(
        base_url: impl Into<String>,
        account: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            account: account.into(),
            password: password.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_request_retries: DEFAULT_MAX_REQUEST_RETRIES,
            max_login_retries: DEFAULT_MAX_LOGIN_RETRIES,
            retry_backoff_unit: Duration::from_secs(1),
        }
    }

    /// Set the total request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the number of attempts for a single API request.
    pub fn with_max_request_retries(mut self, retries: u32) -> Self {
        self.max_request_retries = retries;
        self
    }

    /// Set the retry backoff unit (useful to shorten in tests).
    pub fn with_retry_backoff_unit(mut self, unit: Duration) -> Self {
        self.retry_backoff_unit = unit;
        self
    }
}
