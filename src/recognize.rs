//! Streaming speech recognition over a WebSocket.
//!
//! Audio chunks are written on one side; recognition results come back as
//! [`RecognizeEvent`]s on the other, in the order the server sent them.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::messages::*;
use crate::models::SpeechRecognitionResults;
use crate::queue::BoundedQueue;
use crate::service::BaseService;
use crate::ws::{to_ws_url, WebSocket};

/// Maximum number of events buffered from frames that carried several messages.
const PENDING_CAPACITY: usize = 256;

/// Events emitted by the recognize stream.
#[derive(Debug, Clone)]
pub enum RecognizeEvent {
    /// The service is ready to receive audio.
    Listening,
    /// Interim or final recognition results.
    Results(SpeechRecognitionResults),
    /// Speaker diarization results.
    SpeakerLabels(Value),
    /// An error reported by the service.
    Error {
        /// Error message.
        message: String,
    },
    /// Non-fatal warnings about the request, e.g. unknown parameters.
    Warnings(Vec<String>),
    /// All results for the submitted audio have been delivered.
    EndOfStream,
    /// A message this client does not know, passed through unchanged.
    Unknown(Value),

    Ping,
    Pong,
    Frame,
}

/// Configuration for a recognize stream.
#[derive(Debug, Clone)]
pub struct RecognizeConfig {
    /// Audio format, e.g. `audio/l16; rate=16000` or `audio/flac`.
    pub content_type: String,
    /// Base model to use. Defaults to the service default.
    pub model: Option<String>,
    pub language_customization_id: Option<String>,
    pub acoustic_customization_id: Option<String>,
    pub interim_results: bool,
    pub word_confidence: Option<bool>,
    pub timestamps: Option<bool>,
    pub max_alternatives: Option<u32>,
    /// Seconds of silence after which the service closes the stream, -1 for never.
    pub inactivity_timeout: Option<i32>,
    pub smart_formatting: Option<bool>,
    pub speaker_labels: Option<bool>,
    pub keywords: Vec<String>,
    pub keywords_threshold: Option<f32>,
}

impl RecognizeConfig {
    /// Creates a configuration with only the audio content type set.
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            model: None,
            language_customization_id: None,
            acoustic_customization_id: None,
            interim_results: false,
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

    fn start_message(&self) -> RecognizeStartMessage {
        let mut msg = RecognizeStartMessage::new(self.content_type.clone(), self.interim_results);
        msg.word_confidence = self.word_confidence;
        msg.timestamps = self.timestamps;
        msg.max_alternatives = self.max_alternatives;
        msg.inactivity_timeout = self.inactivity_timeout;
        msg.smart_formatting = self.smart_formatting;
        msg.speaker_labels = self.speaker_labels;
        msg.keywords = self.keywords.clone();
        msg.keywords_threshold = self.keywords_threshold;
        msg
    }
}

/// Bidirectional recognition stream.
pub struct RecognizeStream {
    url: String,
    headers: HeaderMap,
    disable_ssl_verification: bool,
    config: RecognizeConfig,
    conn: RwLock<Option<Arc<WebSocket>>>,
    pending: BoundedQueue<RecognizeEvent>,
    ready: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
    stopping: Arc<AtomicBool>,
    session_id: String,
}

impl RecognizeStream {
    /// Creates a stream for the service behind `service`. Nothing is sent until [`start`](Self::start).
    pub fn new(service: &BaseService, config: RecognizeConfig) -> Result<Self, Error> {
        let url = recognize_url(&service.config().service_url, &config)?;
        let mut headers = service.default_headers()?;
        let content_type = HeaderValue::from_str(&config.content_type)
            .map_err(|e| Error::InvalidHeader(e.to_string()))?;
        headers.insert(CONTENT_TYPE, content_type);

        Ok(Self {
            url,
            headers,
            disable_ssl_verification: service.config().disable_ssl_verification,
            config,
            conn: RwLock::new(None),
            pending: BoundedQueue::new(PENDING_CAPACITY),
            ready: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
            stopping: Arc::new(AtomicBool::new(false)),
            session_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
        })
    }

    /// The WebSocket URL this stream connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connects, sends the start message and waits until the service is listening.
    ///
    /// A connection left from an earlier session is closed first. If the
    /// handshake fails the new connection is closed before returning.
    pub async fn start(&self) -> Result<(), Error> {
        info!(session_id = %self.session_id, "Recognize starting");

        self.close_conn().await;
        self.ready.store(false, Ordering::SeqCst);
        self.error_count.store(0, Ordering::SeqCst);
        self.stopping.store(false, Ordering::SeqCst);
        self.pending.clear().await;

        let conn = WebSocket::connect(
            &self.url,
            self.headers.clone(),
            self.disable_ssl_verification,
        )
        .await?;
        *self.conn.write().await = Some(Arc::new(conn));

        if let Err(e) = self.handshake().await {
            error!(session_id = %self.session_id, error = %e, "Recognize start failed");
            self.close_conn().await;
            return Err(e);
        }

        info!(session_id = %self.session_id, "Recognize started");
        Ok(())
    }

    async fn handshake(&self) -> Result<(), Error> {
        self.send_start().await?;

        loop {
            match self.next_event().await? {
                RecognizeEvent::Listening => return Ok(()),
                RecognizeEvent::Error { message } => {
                    return Err(Error::ServerError { message });
                }
                RecognizeEvent::Results(_)
                | RecognizeEvent::SpeakerLabels(_)
                | RecognizeEvent::EndOfStream => {
                    return Err(Error::UnexpectedEvent("results before listening".to_string()));
                }
                _ => continue,
            }
        }
    }

    /// Sends one chunk of audio.
    pub async fn write(&self, audio: Vec<u8>) -> Result<(), Error> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(Error::Stopping);
        }
        if !self.is_running() {
            return Err(Error::NotReady);
        }
        debug!(len = audio.len(), "Sending audio chunk");
        self.conn().await?.send_binary(audio).await
    }

    /// Signals the end of the audio. Results keep arriving until [`RecognizeEvent::EndOfStream`].
    pub async fn end(&self) -> Result<(), Error> {
        debug!(session_id = %self.session_id, "Sending stop");
        self.stopping.store(true, Ordering::SeqCst);

        let json = serde_json::to_string(&RecognizeStopMessage::new())?;
        match self.conn.read().await.as_ref() {
            Some(conn) => conn.send_text(&json).await,
            None => Ok(()),
        }
    }

    /// Closes the connection.
    pub async fn shutdown(&self) {
        info!(session_id = %self.session_id, "Recognize shutting down");

        self.close_conn().await;
        self.ready.store(false, Ordering::SeqCst);

        info!(session_id = %self.session_id, "Recognize shut down");
    }

    async fn close_conn(&self) {
        if let Some(conn) = self.conn.write().await.take() {
            let _ = conn.close().await;
        }
    }

    /// Returns true if the stream is listening and accepting audio.
    pub fn is_running(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
            && self.error_count.load(Ordering::SeqCst) == 0
            && !self.stopping.load(Ordering::SeqCst)
    }

    /// Returns the number of errors the service reported.
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    async fn conn(&self) -> Result<Arc<WebSocket>, Error> {
        self.conn.read().await.clone().ok_or(Error::NotReady)
    }

    async fn send_start(&self) -> Result<(), Error> {
        let json = serde_json::to_string(&self.config.start_message())?;
        debug!(json = %json, "Sending recognize start");
        self.conn().await?.send_text(&json).await
    }

    /// Returns the next event, reading from the connection when nothing is buffered.
    pub async fn next_event(&self) -> Result<RecognizeEvent, Error> {
        if let Some(event) = self.pending.pop().await {
            return Ok(event);
        }

        loop {
            let conn = self.conn().await?;
            let text = match conn.recv().await? {
                Message::Text(t) => t,
                Message::Binary(b) => String::from_utf8(b).map_err(|e| {
                    error!(error = %e, "Invalid UTF-8 in binary message");
                    Error::InvalidUtf8
                })?,
                Message::Ping(data) => {
                    debug!("Recognize received ping, sending pong");
                    let _ = conn.send_pong(data).await;
                    return Ok(RecognizeEvent::Ping);
                }
                Message::Pong(_) => return Ok(RecognizeEvent::Pong),
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Recognize received close");
                    self.ready.store(false, Ordering::SeqCst);
                    return Ok(RecognizeEvent::EndOfStream);
                }
                Message::Frame(_) => return Ok(RecognizeEvent::Frame),
            };

            let mut events = parse_fragments(&text)?
                .into_iter()
                .map(|value| self.to_event(value))
                .collect::<Vec<_>>()
                .into_iter();

            // Whitespace-only frames carry nothing; read again.
            if let Some(first) = events.next() {
                self.pending.append(events.collect()).await?;
                return Ok(first);
            }
        }
    }

    /// Converts one JSON value from a frame. Never fails: anything that does
    /// not decode as a known message becomes [`RecognizeEvent::Unknown`].
    fn to_event(&self, value: Value) -> RecognizeEvent {
        if value.get("error").is_some() {
            if let Ok(msg) = ErrorMessage::deserialize(&value) {
                error!(message = %msg.error, "Recognize error");
                self.error_count.fetch_add(1, Ordering::SeqCst);
                return RecognizeEvent::Error { message: msg.error };
            }
        }

        if let Ok(msg) = StateMessage::deserialize(&value) {
            if msg.state == "listening" {
                // After a stop the service reports listening again once it has
                // flushed every result for the submitted audio.
                if self.stopping.load(Ordering::SeqCst) {
                    info!(session_id = %self.session_id, "Recognize end of stream");
                    return RecognizeEvent::EndOfStream;
                }
                info!(session_id = %self.session_id, "Recognize listening");
                self.ready.store(true, Ordering::SeqCst);
                return RecognizeEvent::Listening;
            }
        }

        if value.get("results").is_some() {
            match SpeechRecognitionResults::deserialize(&value) {
                Ok(results) => {
                    debug!(
                        result_index = ?results.result_index,
                        count = results.results.len(),
                        "Recognize results"
                    );
                    return RecognizeEvent::Results(results);
                }
                Err(e) => warn!(error = %e, "Malformed recognize results"),
            }
        }

        if let Some(labels) = value.get("speaker_labels") {
            return RecognizeEvent::SpeakerLabels(labels.clone());
        }

        if let Some(warnings) = value.get("warnings") {
            let warnings = warning_texts(warnings);
            warn!(warnings = ?warnings, "Recognize warnings");
            return RecognizeEvent::Warnings(warnings);
        }

        warn!(message = %value, "Unknown recognize message");
        RecognizeEvent::Unknown(value)
    }
}

fn recognize_url(service_url: &str, config: &RecognizeConfig) -> Result<String, Error> {
    let mut url = format!("{}/v1/recognize", to_ws_url(service_url)?);
    let params = [
        ("model", &config.model),
        ("language_customization_id", &config.language_customization_id),
        ("acoustic_customization_id", &config.acoustic_customization_id),
    ];
    let query: Vec<String> = params
        .iter()
        .filter_map(|&(name, value)| {
            value
                .as_ref()
                .map(|v| format!("{name}={}", urlencoding::encode(v)))
        })
        .collect();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }
    Ok(url)
}
