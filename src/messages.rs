//! Message types for the recognize/synthesize WebSocket protocols.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ============================================================================
// Common
// ============================================================================

/// Splits a text frame into the JSON values it contains.
///
/// The server may deliver several objects in one frame with no separator
/// (`{"a":1}{"b":2}`), or separated by whitespace/newlines. Each value is
/// parsed independently and returned in order.
pub fn parse_fragments(text: &str) -> Result<Vec<Value>, Error> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .map(|v| v.map_err(Error::Json))
        .collect()
}

/// Parses a frame and keeps only its last JSON value.
pub fn parse_latest(text: &str) -> Result<Option<Value>, Error> {
    Ok(parse_fragments(text)?.pop())
}

/// Reads a `warnings` field sent either as one string or as a list of strings.
pub fn warning_texts(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => vec![text.clone()],
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

/// Error message from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error message.
    pub error: String,
}

// ============================================================================
// Recognize Messages
// ============================================================================

/// Start message sent to open a recognition request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeStartMessage {
    /// Always "start".
    pub action: String,
    /// Audio format of the chunks that will follow.
    #[serde(rename = "content-type")]
    pub content_type: String,
    pub interim_results: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_confidence: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_alternatives: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactivity_timeout: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smart_formatting: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_labels: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords_threshold: Option<f32>,
}

impl RecognizeStartMessage {
    pub fn new(content_type: String, interim_results: bool) -> Self {
        Self {
            action: "start".to_string(),
            content_type,
            interim_results,
            word_confidence: None,
            timestamps: None,
            max_alternatives: None,
            inactivity_timeout: None,
            smart_formatting: None,
            speaker_labels: None,
            keywords: Vec::new(),
            keywords_threshold: None,
        }
    }
}

/// Stop message: no more audio will be sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeStopMessage {
    /// Always "stop".
    pub action: String,
}

impl RecognizeStopMessage {
    pub fn new() -> Self {
        Self {
            action: "stop".to_string(),
        }
    }
}

impl Default for RecognizeStopMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// State message, e.g. `{"state": "listening"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMessage {
    pub state: String,
}

// ============================================================================
// Synthesize Messages
// ============================================================================

/// Text message that opens a synthesis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeTextMessage {
    /// Text (or SSML) to synthesize.
    pub text: String,
    /// Requested audio format.
    pub accept: String,
    /// Timing metadata to return: "words" and/or "marks".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timings: Vec<String>,
}

impl SynthesizeTextMessage {
    pub fn new(text: String, accept: String, timings: Vec<String>) -> Self {
        Self {
            text,
            accept,
            timings,
        }
    }
}

/// SSML `<mark>` positions: `[name, seconds]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarksMessage {
    pub marks: Vec<(String, f64)>,
}

/// Word timings: `[word, start, end]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordsMessage {
    pub words: Vec<(String, f64, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_concatenated_fragments_split() {
        let values = parse_fragments(r#"{"a":1}{"b":2}"#).unwrap();
        assert_eq!(values, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn test_latest_fragment() {
        let latest = parse_latest(r#"{"a":1}{"b":2}"#).unwrap();
        assert_eq!(latest, Some(json!({"b": 2})));
    }

    #[test]
    fn test_fragments_with_whitespace_and_nesting() {
        let values = parse_fragments("{\"x\":{\"y\":\"}{\"}}\n {\"state\":\"listening\"}\n").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["x"]["y"], "}{");
        assert_eq!(values[1]["state"], "listening");
    }

    #[test]
    fn test_single_and_empty_frames() {
        assert_eq!(parse_fragments(r#"{"a":1}"#).unwrap().len(), 1);
        assert!(parse_fragments("").unwrap().is_empty());
        assert_eq!(parse_latest("  ").unwrap(), None);
    }

    #[test]
    fn test_truncated_fragment_is_an_error() {
        assert!(matches!(
            parse_fragments(r#"{"a":1}{"b":"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_warning_texts() {
        assert_eq!(warning_texts(&json!("slow down")), vec!["slow down"]);
        assert_eq!(
            warning_texts(&json!(["Unknown arguments: foo.", "bar"])),
            vec!["Unknown arguments: foo.", "bar"]
        );
        assert!(warning_texts(&Value::Null).is_empty());
    }

    #[test]
    fn test_start_message_shape() {
        let mut msg = RecognizeStartMessage::new("audio/l16; rate=16000".to_string(), true);
        msg.timestamps = Some(true);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "start",
                "content-type": "audio/l16; rate=16000",
                "interim_results": true,
                "timestamps": true
            })
        );
        assert_eq!(
            serde_json::to_value(RecognizeStopMessage::new()).unwrap(),
            json!({"action": "stop"})
        );
    }
}
