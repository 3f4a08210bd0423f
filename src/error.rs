//! Error types for the speech client library.

use thiserror::Error;

/// Error type for speech client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// One or more required parameters were empty. No request was sent.
    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingParameter(Vec<String>),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error: {message} (status: {status})")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// WebSocket connection error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TLS connector could not be built.
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// The configured service URL could not be used.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A header name or value was not valid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Client not ready for operations.
    #[error("Client not ready")]
    NotReady,

    /// Client is stopping.
    #[error("Client is stopping")]
    Stopping,

    /// Queue is full.
    #[error("Queue is full")]
    QueueFull,

    /// Connection timeout.
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// Server reported an error over the stream.
    #[error("Server error: {message}")]
    ServerError {
        /// Error message from server.
        message: String,
    },

    /// Binary frame that should have carried text was not UTF-8.
    #[error("Invalid UTF-8 in message")]
    InvalidUtf8,

    /// An event arrived that is not valid in the current state.
    #[error("Unexpected event: {0}")]
    UnexpectedEvent(String),

    /// Channel receive error.
    #[error("Channel receive error")]
    ChannelRecv,
}

/// Fails with [`Error::MissingParameter`] naming every required value that is empty.
///
/// Each entry is `(name, value.is_empty())`.
pub(crate) fn require(params: &[(&str, bool)]) -> Result<(), Error> {
    let missing: Vec<String> = params
        .iter()
        .filter(|(_, empty)| *empty)
        .map(|(name, _)| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingParameter(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_all_present() {
        assert!(require(&[("customization_id", false), ("corpus_name", false)]).is_ok());
    }

    #[test]
    fn test_require_names_every_missing_key() {
        let err = require(&[("customization_id", true), ("corpus_name", false), ("word", true)])
            .unwrap_err();
        match &err {
            Error::MissingParameter(names) => {
                assert_eq!(names, &vec!["customization_id".to_string(), "word".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "Missing required parameters: customization_id, word"
        );
    }
}
