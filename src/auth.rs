//! Request authenticators.
//!
//! The service accepts several credential schemes. The client only needs to
//! put the right header on each HTTP request and on the WebSocket handshake,
//! so an [`Authenticator`] is just something that can decorate a header map.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::Error;

/// Adds credentials to outgoing requests.
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Inserts the credential headers.
    fn authenticate(&self, headers: &mut HeaderMap) -> Result<(), Error>;

    /// Short name of the scheme, used in logs.
    fn scheme(&self) -> &'static str;
}

/// Sends requests without credentials.
#[derive(Debug, Clone, Default)]
pub struct NoAuthAuthenticator;

impl Authenticator for NoAuthAuthenticator {
    fn authenticate(&self, _headers: &mut HeaderMap) -> Result<(), Error> {
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        "noauth"
    }
}

/// HTTP basic authentication.
#[derive(Clone)]
pub struct BasicAuthenticator {
    username: String,
    password: String,
}

impl BasicAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Basic credentials for an API key (`apikey:<key>`).
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::new("apikey", key)
    }
}

impl fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Authenticator for BasicAuthenticator {
    fn authenticate(&self, headers: &mut HeaderMap) -> Result<(), Error> {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        let value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|e| Error::InvalidHeader(e.to_string()))?;
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        "basic"
    }
}

/// A caller-managed bearer token.
#[derive(Clone)]
pub struct BearerTokenAuthenticator {
    token: String,
}

impl BearerTokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerTokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerTokenAuthenticator")
            .field("token", &"***")
            .finish()
    }
}

impl Authenticator for BearerTokenAuthenticator {
    fn authenticate(&self, headers: &mut HeaderMap) -> Result<(), Error> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| Error::InvalidHeader(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        "bearer"
    }
}

/// Picks an authenticator from `{NAME}_APIKEY`, `{NAME}_BEARER_TOKEN` or
/// `{NAME}_USERNAME` + `{NAME}_PASSWORD`, in that order.
pub fn authenticator_from_env(service_name: &str) -> Arc<dyn Authenticator> {
    authenticator_from_lookup(service_name, |key| std::env::var(key).ok())
}

/// Same as [`authenticator_from_env`] with a custom variable lookup.
pub fn authenticator_from_lookup<F>(service_name: &str, lookup: F) -> Arc<dyn Authenticator>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = env_prefix(service_name);
    let var = |suffix: &str| lookup(&format!("{prefix}_{suffix}")).filter(|v| !v.is_empty());

    if let Some(key) = var("APIKEY") {
        return Arc::new(BasicAuthenticator::api_key(key));
    }
    if let Some(token) = var("BEARER_TOKEN") {
        return Arc::new(BearerTokenAuthenticator::new(token));
    }
    if let (Some(user), Some(pass)) = (var("USERNAME"), var("PASSWORD")) {
        return Arc::new(BasicAuthenticator::new(user, pass));
    }
    Arc::new(NoAuthAuthenticator)
}

/// `speech-to-text` becomes `SPEECH_TO_TEXT`.
pub(crate) fn env_prefix(service_name: &str) -> String {
    service_name.to_uppercase().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_basic_header() {
        let mut headers = HeaderMap::new();
        BasicAuthenticator::new("user", "pass")
            .authenticate(&mut headers)
            .unwrap();
        assert_eq!(headers[AUTHORIZATION], "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_bearer_header() {
        let mut headers = HeaderMap::new();
        BearerTokenAuthenticator::new("tok")
            .authenticate(&mut headers)
            .unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
    }

    #[test]
    fn test_from_lookup_prefers_api_key() {
        let auth = authenticator_from_lookup(
            "speech-to-text",
            lookup(&[
                ("SPEECH_TO_TEXT_APIKEY", "k"),
                ("SPEECH_TO_TEXT_BEARER_TOKEN", "t"),
            ]),
        );
        assert_eq!(auth.scheme(), "basic");
    }

    #[test]
    fn test_from_lookup_falls_back_to_noauth() {
        let auth = authenticator_from_lookup("text-to-speech", lookup(&[]));
        assert_eq!(auth.scheme(), "noauth");

        let auth = authenticator_from_lookup(
            "text-to-speech",
            lookup(&[("TEXT_TO_SPEECH_USERNAME", "u")]),
        );
        assert_eq!(auth.scheme(), "noauth");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let auth = BearerTokenAuthenticator::new("secret-token");
        assert!(!format!("{auth:?}").contains("secret-token"));
    }
}
