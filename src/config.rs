//! Service configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::auth::env_prefix;

/// Default request timeout for REST calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration shared by the REST and WebSocket sides of a service client.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the service, e.g. [`crate::STT_URL`].
    pub service_url: String,
    /// Accept invalid TLS certificates and host names.
    pub disable_ssl_verification: bool,
    /// Headers added to every request and to the WebSocket handshake.
    pub headers: HashMap<String, String>,
    /// Timeout for a single REST request.
    pub timeout: Duration,
}

impl ServiceConfig {
    /// Creates a configuration for the given base URL with defaults for the rest.
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            disable_ssl_verification: false,
            headers: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Adds a custom header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Reads `{NAME}_URL` and `{NAME}_DISABLE_SSL`, falling back to `default_url`.
    pub fn from_env(service_name: &str, default_url: &str) -> Self {
        Self::from_lookup(service_name, default_url, |key| std::env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with a custom variable lookup.
    pub fn from_lookup<F>(service_name: &str, default_url: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = env_prefix(service_name);
        let url = lookup(&format!("{prefix}_URL"))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default_url.to_string());
        let disable_ssl = lookup(&format!("{prefix}_DISABLE_SSL"))
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Self {
            disable_ssl_verification: disable_ssl,
            ..Self::new(url)
        }
    }
}
