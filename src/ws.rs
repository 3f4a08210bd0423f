//! WebSocket connection wrapper.

use futures_util::{SinkExt, StreamExt};
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::Error;

const CONN_TIMEOUT: Duration = Duration::from_secs(10);
const RECV_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket connection wrapper.
pub struct WebSocket {
    write: Arc<Mutex<futures_util::stream::SplitSink<WsStream, Message>>>,
    read: Arc<Mutex<futures_util::stream::SplitStream<WsStream>>>,
}

impl WebSocket {
    /// Opens a new WebSocket connection, sending `headers` with the handshake.
    pub async fn connect(
        url: &str,
        headers: HeaderMap,
        disable_ssl_verification: bool,
    ) -> Result<Self, Error> {
        info!(url = %url, "WebSocket connecting");

        let mut request = url.into_client_request()?;
        request.headers_mut().extend(headers);

        let connector = if disable_ssl_verification {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let (ws_stream, _) = timeout(
            CONN_TIMEOUT,
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector),
        )
        .await
        .map_err(|_| Error::ConnectionTimeout)?
        .map_err(Error::WebSocket)?;

        info!(url = %url, "WebSocket connected");

        let (write, read) = ws_stream.split();

        Ok(Self {
            write: Arc::new(Mutex::new(write)),
            read: Arc::new(Mutex::new(read)),
        })
    }

    /// Sends a text message.
    pub async fn send_text(&self, text: &str) -> Result<(), Error> {
        let mut writer = self.write.lock().await;
        writer
            .send(Message::Text(text.to_string()))
            .await
            .map_err(Error::WebSocket)
    }

    /// Sends a binary message.
    pub async fn send_binary(&self, data: Vec<u8>) -> Result<(), Error> {
        let mut writer = self.write.lock().await;
        writer
            .send(Message::Binary(data))
            .await
            .map_err(Error::WebSocket)
    }

    /// Sends a pong message.
    pub async fn send_pong(&self, data: Vec<u8>) -> Result<(), Error> {
        debug!("Sending pong");
        let mut writer = self.write.lock().await;
        writer
            .send(Message::Pong(data))
            .await
            .map_err(Error::WebSocket)
    }

    /// Receives the next message with a timeout.
    pub async fn recv(&self) -> Result<Message, Error> {
        let mut reader = self.read.lock().await;
        match timeout(RECV_TIMEOUT, reader.next()).await {
            Ok(Some(Ok(msg))) => Ok(msg),
            Ok(Some(Err(e))) => Err(Error::WebSocket(e)),
            Ok(None) => Err(Error::ChannelRecv),
            Err(_) => Err(Error::ConnectionTimeout),
        }
    }

    /// Closes the WebSocket connection.
    pub async fn close(&self) -> Result<(), Error> {
        info!("WebSocket closing");
        let mut writer = self.write.lock().await;
        let _ = writer.send(Message::Close(None)).await;
        let _ = writer.close().await;
        info!("WebSocket closed");
        Ok(())
    }
}

/// Rewrites an HTTP(S) service URL to its WebSocket form.
pub(crate) fn to_ws_url(service_url: &str) -> Result<String, Error> {
    let url = service_url.trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = url.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else if url.starts_with("wss://") || url.starts_with("ws://") {
        Ok(url.to_string())
    } else {
        Err(Error::InvalidUrl(service_url.to_string()))
    }
}
