#![forbid(unsafe_code)]

use async_trait::async_trait;
use classchat_domain::{ChannelId, ChannelKind};
use classchat_util::endpoint::ServiceEndpoint;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

use crate::auth::AccessToken;

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("connect failed: {0}")]
	Connect(String),

	#[error("handshake rejected: status={0}")]
	HandshakeRejected(u16),

	#[error("connect timed out")]
	Timeout,

	#[error("send failed: {0}")]
	Send(String),

	#[error("receive failed: {0}")]
	Receive(String),

	#[error("connection closed")]
	Closed,
}

/// Opens live channel sockets.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	async fn connect(&self, url: &str) -> Result<Box<dyn SocketConnection>, TransportError>;
}

/// One open live socket carrying JSON text frames.
#[async_trait]
pub trait SocketConnection: Send {
	async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

	/// Next text frame; `None` once the peer closed the socket.
	async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

	async fn close(&mut self);
}

/// Socket path for `channel`, relative to the websocket base.
pub fn channel_socket_path(channel: &ChannelId, kind: ChannelKind) -> String {
	let id = urlencoding::encode(channel.as_str());
	match kind {
		ChannelKind::Classroom => format!("/ws/chat/classroom/{id}/"),
		ChannelKind::Discussion => format!("/ws/chat/{id}/"),
	}
}

/// Full socket URL including the token query. Never log the result.
pub fn channel_socket_url(ws: &ServiceEndpoint, channel: &ChannelId, kind: ChannelKind, token: &AccessToken) -> String {
	format!(
		"{}?token={}",
		ws.join(&channel_socket_path(channel, kind)),
		urlencoding::encode(token.expose())
	)
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// tokio-tungstenite transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
	async fn connect(&self, url: &str) -> Result<Box<dyn SocketConnection>, TransportError> {
		let (ws, resp) = tokio_tungstenite::connect_async(url).await.map_err(|e| match e {
			tungstenite::Error::Http(resp) => TransportError::HandshakeRejected(resp.status().as_u16()),
			other => TransportError::Connect(other.to_string()),
		})?;
		debug!(status = resp.status().as_u16(), "websocket handshake complete");
		Ok(Box::new(WsConnection { ws }))
	}
}

struct WsConnection {
	ws: WsStream,
}

#[async_trait]
impl SocketConnection for WsConnection {
	async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
		self.ws
			.send(Message::Text(text.into()))
			.await
			.map_err(|e| TransportError::Send(e.to_string()))
	}

	async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
		loop {
			let msg = match self.ws.next().await? {
				Ok(msg) => msg,
				Err(tungstenite::Error::ConnectionClosed) => return None,
				Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
			};
			match msg {
				Message::Text(t) => return Some(Ok(t.as_str().to_owned())),
				Message::Ping(p) => {
					if let Err(e) = self.ws.send(Message::Pong(p)).await {
						return Some(Err(TransportError::Send(e.to_string())));
					}
				}
				Message::Close(frame) => {
					debug!(?frame, "websocket closed by peer");
					return None;
				}
				Message::Binary(b) => {
					warn!(len = b.len(), "ignoring binary websocket frame");
				}
				Message::Pong(_) | Message::Frame(_) => {}
			}
		}
	}

	async fn close(&mut self) {
		if let Err(e) = self.ws.close(None).await {
			debug!(error = %e, "websocket close");
		}
	}
}
