//! WebSocket 커넥터 (`tokio-tungstenite`)

use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{Connection, Connector, TransportError};

/// 수집기 WebSocket 엔드포인트 커넥터
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// 새 커넥터를 생성합니다.
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout,
        }
    }

    /// 연결 타임아웃
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Connector for WebSocketConnector {
    type Conn = WebSocketConnection;

    async fn connect(&self) -> Result<WebSocketConnection, TransportError> {
        let handshake = connect_async(self.endpoint.as_str());
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::Connect(format!(
                    "timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(WebSocketConnection { stream })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// 열린 WebSocket 연결
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection for WebSocketConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| match e {
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                | tokio_tungstenite::tungstenite::Error::AlreadyClosed => TransportError::Closed,
                other => TransportError::Send(other.to_string()),
            })
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
