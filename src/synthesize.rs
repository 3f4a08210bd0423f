//! Streaming speech synthesis over a WebSocket.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::messages::*;
use crate::queue::BoundedQueue;
use crate::service::BaseService;
use crate::ws::{to_ws_url, WebSocket};

const PENDING_CAPACITY: usize = 256;

/// Events emitted by the synthesize stream.
#[derive(Debug, Clone)]
pub enum SynthesizeEvent {
    /// A chunk of synthesized audio in the requested format.
    Audio(Vec<u8>),
    /// SSML mark positions: `(name, seconds)`.
    Marks(Vec<(String, f64)>),
    /// Word timings: `(word, start, end)`.
    Words(Vec<(String, f64, f64)>),
    /// Non-fatal warnings about the request.
    Warnings(Vec<String>),
    /// An error reported by the service.
    Error {
        /// Error message.
        message: String,
    },
    /// The service closed the stream; all audio has been delivered.
    EndOfStream,
    /// A message this client does not know, passed through unchanged.
    Unknown(Value),

    Ping,
    Pong,
    Frame,
}

/// Configuration for a synthesize stream.
#[derive(Debug, Clone)]
pub struct SynthesizeConfig {
    /// Text or SSML to synthesize.
    pub text: String,
    /// Audio format, e.g. `audio/ogg;codecs=opus` or `audio/l16;rate=22050`.
    pub accept: String,
    pub voice: Option<String>,
    pub customization_id: Option<String>,
    /// Timing metadata to request: `words` and/or `marks`.
    pub timings: Vec<String>,
}

impl SynthesizeConfig {
    pub fn new(text: impl Into<String>, accept: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            accept: accept.into(),
            voice: None,
            customization_id: None,
            timings: Vec::new(),
        }
    }
}

/// Text-to-Speech stream: one text in, audio chunks out.
pub struct SynthesizeStream {
    url: String,
    headers: HeaderMap,
    disable_ssl_verification: bool,
    config: SynthesizeConfig,
    conn: RwLock<Option<Arc<WebSocket>>>,
    pending: BoundedQueue<SynthesizeEvent>,
    ready: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
    session_id: String,
}

impl SynthesizeStream {
    pub fn new(service: &BaseService, config: SynthesizeConfig) -> Result<Self, Error> {
        let url = synthesize_url(&service.config().service_url, &config)?;
        Ok(Self {
            url,
            headers: service.default_headers()?,
            disable_ssl_verification: service.config().disable_ssl_verification,
            config,
            conn: RwLock::new(None),
            pending: BoundedQueue::new(PENDING_CAPACITY),
            ready: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
            session_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
        })
    }

    /// The WebSocket URL this stream connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connects and sends the text. Audio follows through [`next_event`](Self::next_event).
    ///
    /// A connection left from an earlier session is closed first.
    pub async fn start(&self) -> Result<(), Error> {
        info!(session_id = %self.session_id, "Synthesize starting");

        self.close_conn().await;
        self.ready.store(false, Ordering::SeqCst);
        self.error_count.store(0, Ordering::SeqCst);
        self.pending.clear().await;

        let conn = WebSocket::connect(
            &self.url,
            self.headers.clone(),
            self.disable_ssl_verification,
        )
        .await?;
        *self.conn.write().await = Some(Arc::new(conn));

        if let Err(e) = self.send_text().await {
            error!(session_id = %self.session_id, error = %e, "Synthesize start failed");
            self.close_conn().await;
            return Err(e);
        }
        self.ready.store(true, Ordering::SeqCst);

        info!(session_id = %self.session_id, "Synthesize started");
        Ok(())
    }

    /// Closes the connection.
    pub async fn shutdown(&self) {
        info!(session_id = %self.session_id, "Synthesize shutting down");

        self.close_conn().await;
        self.ready.store(false, Ordering::SeqCst);

        info!(session_id = %self.session_id, "Synthesize shut down");
    }

    async fn close_conn(&self) {
        if let Some(conn) = self.conn.write().await.take() {
            let _ = conn.close().await;
        }
    }

    /// Returns true if the stream is connected and no error was reported.
    pub fn is_running(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.error_count.load(Ordering::SeqCst) == 0
    }

    /// Returns the number of errors the service reported.
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    async fn conn(&self) -> Result<Arc<WebSocket>, Error> {
        self.conn.read().await.clone().ok_or(Error::NotReady)
    }

    async fn send_text(&self) -> Result<(), Error> {
        let payload = SynthesizeTextMessage::new(
            self.config.text.clone(),
            self.config.accept.clone(),
            self.config.timings.clone(),
        );
        let json = serde_json::to_string(&payload)?;
        debug!(len = self.config.text.len(), accept = %self.config.accept, "Sending synthesize text");
        self.conn().await?.send_text(&json).await
    }

    /// Collects every audio chunk until the end of the stream.
    pub async fn collect_audio(&self) -> Result<Vec<u8>, Error> {
        let mut audio = Vec::new();
        loop {
            match self.next_event().await? {
                SynthesizeEvent::Audio(chunk) => audio.extend_from_slice(&chunk),
                SynthesizeEvent::Error { message } => return Err(Error::ServerError { message }),
                SynthesizeEvent::EndOfStream => return Ok(audio),
                _ => {}
            }
        }
    }

    pub async fn next_event(&self) -> Result<SynthesizeEvent, Error> {
        if let Some(event) = self.pending.pop().await {
            return Ok(event);
        }

        loop {
            let conn = self.conn().await?;
            let text = match conn.recv().await? {
                Message::Text(t) => t,
                Message::Binary(b) => {
                    debug!(len = b.len(), "Synthesize audio chunk received");
                    return Ok(SynthesizeEvent::Audio(b));
                }
                Message::Ping(data) => {
                    debug!("Synthesize received ping");
                    let _ = conn.send_pong(data).await;
                    return Ok(SynthesizeEvent::Ping);
                }
                Message::Pong(_) => return Ok(SynthesizeEvent::Pong),
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Synthesize received close");
                    self.ready.store(false, Ordering::SeqCst);
                    return Ok(SynthesizeEvent::EndOfStream);
                }
                Message::Frame(_) => return Ok(SynthesizeEvent::Frame),
            };

            let mut events = parse_fragments(&text)?
                .into_iter()
                .map(|value| self.to_event(value))
                .collect::<Vec<_>>()
                .into_iter();

            if let Some(first) = events.next() {
                self.pending.append(events.collect()).await?;
                return Ok(first);
            }
        }
    }

    /// Converts one JSON value from a frame. Anything that does not decode as
    /// a known message becomes [`SynthesizeEvent::Unknown`].
    fn to_event(&self, value: Value) -> SynthesizeEvent {
        if value.get("error").is_some() {
            if let Ok(msg) = ErrorMessage::deserialize(&value) {
                error!(message = %msg.error, "Synthesize error");
                self.error_count.fetch_add(1, Ordering::SeqCst);
                return SynthesizeEvent::Error { message: msg.error };
            }
        }
        if value.get("marks").is_some() {
            if let Ok(msg) = MarksMessage::deserialize(&value) {
                return SynthesizeEvent::Marks(msg.marks);
            }
        }
        if value.get("words").is_some() {
            if let Ok(msg) = WordsMessage::deserialize(&value) {
                return SynthesizeEvent::Words(msg.words);
            }
        }
        if let Some(warnings) = value.get("warnings") {
            let warnings = warning_texts(warnings);
            warn!(warnings = ?warnings, "Synthesize warnings");
            return SynthesizeEvent::Warnings(warnings);
        }

        warn!(message = %value, "Unknown synthesize message");
        SynthesizeEvent::Unknown(value)
    }
}

fn synthesize_url(service_url: &str, config: &SynthesizeConfig) -> Result<String, Error> {
    let mut url = format!("{}/v1/synthesize", to_ws_url(service_url)?);
    let mut query = Vec::new();
    if let Some(voice) = &config.voice {
        query.push(format!("voice={}", urlencoding::encode(voice)));
    }
    if let Some(id) = &config.customization_id {
        query.push(format!("customization_id={}", urlencoding::encode(id)));
    }
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuthAuthenticator;
    use crate::config::ServiceConfig;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn stream(config: SynthesizeConfig) -> SynthesizeStream {
        let service = BaseService::new(
            ServiceConfig::new("https://tts.example.test"),
            Arc::new(NoAuthAuthenticator),
        )
        .unwrap();
        SynthesizeStream::new(&service, config).unwrap()
    }

    #[test]
    fn test_url() {
        let mut config = SynthesizeConfig::new("hello", "audio/wav");
        config.voice = Some("en-US_AllisonV3Voice".to_string());
        assert_eq!(
            stream(config).url(),
            "wss://tts.example.test/v1/synthesize?voice=en-US_AllisonV3Voice"
        );
    }

    #[test]
    fn test_metadata_events() {
        let s = stream(SynthesizeConfig::new("hello", "audio/wav"));

        match s.to_event(json!({"words": [["hello", 0.1, 0.4]]})) {
            SynthesizeEvent::Words(words) => {
                assert_eq!(words, vec![("hello".to_string(), 0.1, 0.4)]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match s.to_event(json!({"marks": [["here", 0.5]]})) {
            SynthesizeEvent::Marks(marks) => assert_eq!(marks[0].0, "here"),
            other => panic!("unexpected event: {other:?}"),
        }
        match s.to_event(json!({"warnings": "Unknown voice parameter"})) {
            SynthesizeEvent::Warnings(w) => assert_eq!(w, vec!["Unknown voice parameter"]),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            s.to_event(json!({"error": "voice not found"})),
            SynthesizeEvent::Error { .. }
        ));
        assert_eq!(s.error_count(), 1);
        assert!(matches!(
            s.to_event(json!({"binary_streams": []})),
            SynthesizeEvent::Unknown(_)
        ));
        assert!(matches!(
            s.to_event(json!({"words": "garbled"})),
            SynthesizeEvent::Unknown(_)
        ));
    }

    #[tokio::test]
    async fn test_next_event_before_start() {
        let s = stream(SynthesizeConfig::new("hello", "audio/wav"));
        assert!(matches!(s.next_event().await, Err(Error::NotReady)));
    }

    #[tokio::test]
    async fn test_session_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let request = ws.next().await.unwrap().unwrap();

            ws.send(Message::Binary(vec![1, 2])).await.unwrap();
            ws.send(Message::Text(
                concat!(
                    r#"{"marks":[["m1",0.25]]}"#,
                    r#"{"binary_streams":[{"content_type":"audio/wav"}]}"#,
                    r#"{"words":[["hello",0.1,0.4]]}"#,
                )
                .to_string(),
            ))
            .await
            .unwrap();
            ws.send(Message::Binary(vec![3, 4])).await.unwrap();
            ws.close(None).await.unwrap();
            request
        });

        let mut config = SynthesizeConfig::new("hello", "audio/wav");
        config.timings = vec!["words".to_string()];
        let service =
            BaseService::new(ServiceConfig::new(url), Arc::new(NoAuthAuthenticator)).unwrap();
        let s = SynthesizeStream::new(&service, config).unwrap();
        s.start().await.unwrap();
        assert!(s.is_running());

        assert!(matches!(
            s.next_event().await.unwrap(),
            SynthesizeEvent::Audio(a) if a == vec![1, 2]
        ));
        assert!(matches!(
            s.next_event().await.unwrap(),
            SynthesizeEvent::Marks(_)
        ));
        assert!(matches!(
            s.next_event().await.unwrap(),
            SynthesizeEvent::Unknown(_)
        ));
        assert!(matches!(
            s.next_event().await.unwrap(),
            SynthesizeEvent::Words(_)
        ));
        assert_eq!(s.collect_audio().await.unwrap(), vec![3, 4]);

        match server.await.unwrap() {
            Message::Text(t) => {
                let request: Value = serde_json::from_str(&t).unwrap();
                assert_eq!(
                    request,
                    json!({"text": "hello", "accept": "audio/wav", "timings": ["words"]})
                );
            }
            other => panic!("unexpected request frame: {other:?}"),
        }
        s.shutdown().await;
    }
}
