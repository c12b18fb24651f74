#![forbid(unsafe_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context as _;
use classchat_client_core::{ChatEngine, ClientConfig, ConnectionStatus, EngineContext, EngineEvent, SecretString};
use classchat_domain::{ChannelId, ChannelKind, DeliveryState, MessageId};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const WAIT: Duration = Duration::from_secs(5);

static LOG_INIT: OnceLock<()> = OnceLock::new();

fn init_test_logging() {
	LOG_INIT.get_or_init(|| {
		if std::env::var_os("CLASSCHAT_TEST_LOG").is_none() {
			return;
		}

		let _ = tracing_subscriber::fmt()
			.with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
			.with_target(false)
			.try_init();
	});
}

/// Minimal HTTP/1.1 responder: every request gets `body` as JSON.
async fn spawn_history_server(body: Value, seen: Arc<Mutex<Vec<String>>>) -> anyhow::Result<String> {
	let listener = TcpListener::bind("127.0.0.1:0").await.context("bind history listener")?;
	let addr = listener.local_addr()?;

	tokio::spawn(async move {
		while let Ok((mut stream, _)) = listener.accept().await {
			let body = body.to_string();
			let seen = Arc::clone(&seen);
			tokio::spawn(async move {
				let mut buf = Vec::new();
				let mut chunk = [0u8; 1024];
				while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
					match stream.read(&mut chunk).await {
						Ok(0) | Err(_) => return,
						Ok(n) => buf.extend_from_slice(&chunk[..n]),
					}
				}
				seen.lock().push(String::from_utf8_lossy(&buf).into_owned());

				let resp = format!(
					"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
					body.len(),
					body
				);
				let _ = stream.write_all(resp.as_bytes()).await;
				let _ = stream.shutdown().await;
			});
		}
	});

	Ok(format!("http://{addr}"))
}

struct AcceptedSocket {
	uri: String,
	ws: WebSocketStream<TcpStream>,
}

async fn spawn_ws_server() -> anyhow::Result<(String, mpsc::UnboundedReceiver<AcceptedSocket>)> {
	let listener = TcpListener::bind("127.0.0.1:0").await.context("bind ws listener")?;
	let addr = listener.local_addr()?;
	let (tx, rx) = mpsc::unbounded_channel();

	tokio::spawn(async move {
		while let Ok((stream, _)) = listener.accept().await {
			let uri = Arc::new(Mutex::new(String::new()));
			let captured = Arc::clone(&uri);
			let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
				*captured.lock() = req.uri().to_string();
				Ok(resp)
			};
			let accepted = tokio_tungstenite::accept_hdr_async(stream, callback).await;
			if let Ok(ws) = accepted {
				let uri = uri.lock().clone();
				let _ = tx.send(AcceptedSocket { uri, ws });
			}
		}
	});

	Ok((format!("ws://{addr}"), rx))
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
	loop {
		let msg = timeout(WAIT, ws.next())
			.await
			.expect("timed out waiting for client frame")
			.expect("client socket open")
			.expect("valid websocket message");
		if let Message::Text(text) = msg {
			return serde_json::from_str(text.as_str()).expect("client frame is json");
		}
	}
}

async fn push(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
	ws.send(Message::Text(frame.to_string().into())).await.expect("push frame");
}

#[tokio::test]
async fn classroom_channel_round_trip_over_real_sockets() -> anyhow::Result<()> {
	init_test_logging();

	let seen = Arc::new(Mutex::new(Vec::new()));
	let history = json!([
		{"id": 1, "content": "welcome", "sender_id": 2, "sender_name": "Teacher", "timestamp": "2024-05-01T09:00:00Z"}
	]);
	let http_base = spawn_history_server(history, Arc::clone(&seen)).await?;
	let (ws_base, mut sockets) = spawn_ws_server().await?;

	let cfg = ClientConfig {
		http_base_url: http_base,
		ws_base_url: ws_base,
		access_token: Some(SecretString::new("secret")),
		user_id: Some("1".to_string()),
		display_name: Some("Student".to_string()),
		..ClientConfig::default()
	};
	let (engine, mut events) = ChatEngine::new(EngineContext::from_config(&cfg)?);
	let channel = ChannelId::new("7")?;
	engine.select_channel(channel.clone(), ChannelKind::Classroom).await;

	let AcceptedSocket { uri, mut ws } = timeout(WAIT, sockets.recv())
		.await
		.context("no websocket connection")?
		.context("ws server stopped")?;
	assert_eq!(uri, "/ws/chat/classroom/7/?token=secret");

	// history from another user is acknowledged once the socket is open
	assert_eq!(next_json(&mut ws).await, json!({"type": "read_receipt", "message_id": "1"}));
	{
		let requests = seen.lock();
		assert_eq!(requests.len(), 1);
		assert!(requests[0].starts_with("GET /api/classroom/chat/7/messages/ HTTP/1.1"));
		assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer secret"));
	}

	push(
		&mut ws,
		json!({"type": "message", "message_id": 2, "message": "any questions?", "sender_id": 2, "sender": "Teacher", "timestamp": "2024-05-01T09:01:00Z"}),
	)
	.await;
	assert_eq!(next_json(&mut ws).await, json!({"type": "read_receipt", "message_id": "2"}));

	let local = engine.send("yes, one").await?;
	let sent = next_json(&mut ws).await;
	assert_eq!(sent["type"], "send");
	assert_eq!(sent["message"], "yes, one");
	assert_eq!(sent["sender_id"], "1");
	assert_eq!(sent["client_message_id"], local.as_str());

	push(
		&mut ws,
		json!({
			"type": "message",
			"message_id": 3,
			"message": "yes, one",
			"sender_id": 1,
			"sender": "Student",
			"timestamp": "2024-05-01T09:02:00Z",
			"client_message_id": local.as_str()
		}),
	)
	.await;

	let snapshot = timeout(WAIT, async {
		loop {
			if let Some(EngineEvent::TimelineChanged { snapshot, .. }) = events.recv().await
				&& snapshot.iter().any(|m| m.id == MessageId::new("3").expect("id"))
			{
				return snapshot;
			}
		}
	})
	.await
	.context("echo never confirmed the send")?;

	let ids: Vec<&str> = snapshot.iter().map(|m| m.id.as_str()).collect();
	assert_eq!(ids, vec!["1", "2", "3"]);
	assert_eq!(snapshot[2].delivery_state, DeliveryState::Confirmed);
	assert_eq!(
		engine.connection_state(&channel).map(|s| s.status),
		Some(ConnectionStatus::Open)
	);

	engine.deselect().await;
	let closed = timeout(WAIT, ws.next()).await.context("socket not closed")?;
	assert!(matches!(closed, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
	Ok(())
}
