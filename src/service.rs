//! HTTP request executor shared by the typed operation methods.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::auth::Authenticator;
use crate::config::ServiceConfig;
use crate::error::Error;

/// Body of an outgoing request.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(serde_json::Value),
    Bytes {
        content_type: String,
        data: Vec<u8>,
    },
    Multipart(Vec<FormPart>),
}

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A fully described request: method, path template, parameters and body.
///
/// Path templates use `{name}` placeholders which are replaced by the
/// percent-encoded values given with [`Request::path_param`].
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: &'static str,
    path_params: Vec<(&'static str, String)>,
    query: Vec<(&'static str, String)>,
    headers: Vec<(&'static str, String)>,
    body: Body,
}

impl Request {
    pub fn new(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            path_params: Vec::new(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn get(path: &'static str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &'static str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &'static str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: &'static str) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn path_param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.path_params.push((name, value.into()));
        self
    }

    pub fn query(mut self, name: &'static str, value: impl ToString) -> Self {
        self.query.push((name, value.to_string()));
        self
    }

    /// Adds a query parameter only when a value is set.
    pub fn query_opt<T: ToString>(self, name: &'static str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.query(name, v),
            None => self,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn accept(self, value: impl Into<String>) -> Self {
        self.header("Accept", value)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn bytes(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = Body::Bytes {
            content_type: content_type.into(),
            data,
        };
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = Body::Multipart(parts);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path with every `{name}` placeholder substituted.
    pub fn render_path(&self) -> String {
        let mut path = self.path.to_string();
        for (name, value) in &self.path_params {
            path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(value));
        }
        path
    }
}

/// Uniform result of a successful request.
#[derive(Debug, Clone)]
pub struct DetailedResponse<T> {
    pub result: T,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<serde_json::Value>,
    message: Option<String>,
    code_description: Option<String>,
}

/// Executes [`Request`]s against one service.
#[derive(Debug, Clone)]
pub struct BaseService {
    http: reqwest::Client,
    config: ServiceConfig,
    authenticator: Arc<dyn Authenticator>,
}

impl BaseService {
    pub fn new(config: ServiceConfig, authenticator: Arc<dyn Authenticator>) -> Result<Self, Error> {
        if config.service_url.is_empty() {
            return Err(Error::InvalidUrl("service URL is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.disable_ssl_verification)
            .build()?;

        Ok(Self {
            http,
            config,
            authenticator,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    /// Absolute URL for a request, without the query string.
    pub fn url(&self, request: &Request) -> String {
        format!(
            "{}{}",
            self.config.service_url.trim_end_matches('/'),
            request.render_path()
        )
    }

    /// Custom headers from the config plus the authenticator's credentials.
    pub fn default_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.config.headers {
            insert_header(&mut headers, name, value)?;
        }
        self.authenticator.authenticate(&mut headers)?;
        Ok(headers)
    }

    /// Sends the request and deserializes a JSON result.
    ///
    /// An empty response body deserializes as JSON `null`, so `()` and
    /// `serde_json::Value` work for operations without a result.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: Request,
    ) -> Result<DetailedResponse<T>, Error> {
        let response = self.execute_bytes(request).await?;
        let body: &[u8] = if response.result.is_empty() {
            b"null"
        } else {
            &response.result
        };
        let result = serde_json::from_slice(body)?;
        Ok(DetailedResponse {
            result,
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
        })
    }

    /// Sends the request and returns the raw response body.
    pub async fn execute_bytes(
        &self,
        request: Request,
    ) -> Result<DetailedResponse<Vec<u8>>, Error> {
        let url = self.url(&request);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut headers = self.default_headers()?;
        if !request.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("accept")) {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        for (name, value) in &request.headers {
            insert_header(&mut headers, name, value)?;
        }

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .headers(headers)
            .query(&request.query);

        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Bytes { content_type, data } => builder
                .header(CONTENT_TYPE, content_type)
                .body(data),
            Body::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = error_message(&bytes, status.canonical_reason());
            error!(status = status.as_u16(), message = %message, url = %url, "Request failed");
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!(status = status.as_u16(), len = bytes.len(), "Request succeeded");
        Ok(DetailedResponse {
            result: bytes.to_vec(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: response_headers,
        })
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), Error> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::InvalidHeader(format!("{name}: {e}")))?;
    let value =
        HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader(format!("{name}: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

fn build_form(parts: Vec<FormPart>) -> Result<multipart::Form, Error> {
    let mut form = multipart::Form::new();
    for part in parts {
        let mut p = multipart::Part::bytes(part.data).mime_str(&part.content_type)?;
        if let Some(file_name) = part.file_name {
            p = p.file_name(file_name);
        }
        form = form.part(part.name, p);
    }
    Ok(form)
}

/// Extracts a readable message from an error response body.
fn error_message(body: &[u8], reason: Option<&str>) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        let from_error = parsed.error.and_then(|e| match e {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
        });
        if let Some(message) = from_error.or(parsed.message).or(parsed.code_description) {
            return message;
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        reason.unwrap_or("unknown error").to_string()
    } else {
        text
    }
}
