#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use classchat_domain::{
	Capabilities, ChannelId, ChannelKind, DeleteTransport, DeliveryState, Message, MessageId, UserId, parse_timestamp,
};
use classchat_protocol::{EditEvent, InboundFrame, OutboundFrame, decode_frame, encode_frame};
use classchat_util::endpoint::{ServiceEndpoint, validate_http_endpoint, validate_ws_endpoint};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::ClientCoreError;
use crate::auth::{AuthTokenProvider, StaticTokenProvider};
use crate::commands::{CommandError, OutboundCommand, check_delete, check_edit, check_text, new_client_message_id};
use crate::config::ClientConfig;
use crate::connection::{CloseReason, ConnectionState, ConnectionStatus};
use crate::history::{HistoryError, HistoryPage, HistorySource, HttpHistoryClient};
use crate::receipts::ReadReceiptTracker;
use crate::reconnect::ReconnectPolicy;
use crate::timeline::{TimelineStore, map_raw_message};
use crate::transport::{SocketConnection, Transport, TransportError, WsTransport, channel_socket_path, channel_socket_url};

const CHANNEL_COMMAND_CAPACITY: usize = 64;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// The signed-in user the engine acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
	pub id: UserId,
	pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
	pub ws_endpoint: ServiceEndpoint,
	pub connect_timeout: Duration,
	pub reconnect: ReconnectPolicy,
	pub max_frame_bytes: usize,
	pub history_max_pages: u32,
}

impl EngineSettings {
	pub fn from_config(cfg: &ClientConfig) -> Result<Self, ClientCoreError> {
		let ws_endpoint = validate_ws_endpoint(&cfg.ws_base_url).map_err(ClientCoreError::Endpoint)?;
		Ok(Self {
			ws_endpoint,
			connect_timeout: cfg.connect_timeout,
			reconnect: cfg.reconnect_policy(),
			max_frame_bytes: cfg.max_frame_bytes,
			history_max_pages: cfg.history_max_pages,
		})
	}
}

/// Collaborators and settings shared by every channel task.
pub struct EngineContext {
	pub current_user: CurrentUser,
	pub auth: Arc<dyn AuthTokenProvider>,
	pub history: Arc<dyn HistorySource>,
	pub transport: Arc<dyn Transport>,
	pub settings: EngineSettings,
}

impl EngineContext {
	/// Production wiring: static token, reqwest history client, tokio-tungstenite transport.
	pub fn from_config(cfg: &ClientConfig) -> Result<Self, ClientCoreError> {
		let user_id = cfg
			.user_id
			.as_deref()
			.ok_or_else(|| ClientCoreError::Config("user_id is not set".to_string()))?;
		let id = UserId::new(user_id).map_err(|e| ClientCoreError::Config(format!("user_id: {e}")))?;
		let display_name = cfg.display_name.clone().unwrap_or_else(|| id.to_string());

		let http = validate_http_endpoint(&cfg.http_base_url).map_err(ClientCoreError::Endpoint)?;
		let auth: Arc<dyn AuthTokenProvider> = Arc::new(StaticTokenProvider::new(cfg.access_token.clone()));
		let history = Arc::new(HttpHistoryClient::new(http, cfg.history_page_size, Arc::clone(&auth)));

		Ok(Self {
			current_user: CurrentUser { id, display_name },
			auth,
			history,
			transport: Arc::new(WsTransport),
			settings: EngineSettings::from_config(cfg)?,
		})
	}
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
	TimelineChanged {
		channel: ChannelId,
		snapshot: Arc<[Message]>,
	},
	Connection {
		channel: ChannelId,
		state: ConnectionState,
	},
	HistoryFailed {
		channel: ChannelId,
		error: String,
	},
}

enum ChannelCommand {
	Send {
		text: String,
		reply: oneshot::Sender<Result<MessageId, CommandError>>,
	},
	Edit {
		message_id: MessageId,
		text: String,
		reply: oneshot::Sender<Result<(), CommandError>>,
	},
	Delete {
		message_id: MessageId,
		reply: oneshot::Sender<Result<(), CommandError>>,
	},
	Close {
		reply: oneshot::Sender<()>,
	},
}

/// Results of work spawned by a channel task.
enum TaskEvent {
	HistoryPage {
		generation: u64,
		cursor: Option<u32>,
		page: HistoryPage,
	},
	HistoryFailed {
		generation: u64,
		error: HistoryError,
	},
	DeleteDone {
		message_id: MessageId,
		result: Result<(), HistoryError>,
		reply: oneshot::Sender<Result<(), CommandError>>,
	},
}

struct ActiveChannel {
	channel: ChannelId,
	epoch: u64,
	cmd_tx: mpsc::Sender<ChannelCommand>,
	task: JoinHandle<()>,
}

/// Handle to the messaging core. At most one channel is active at a time.
pub struct ChatEngine {
	ctx: Arc<EngineContext>,
	store: TimelineStore,
	events_tx: mpsc::UnboundedSender<EngineEvent>,
	active: Mutex<Option<ActiveChannel>>,
}

impl ChatEngine {
	pub fn new(ctx: EngineContext) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let engine = Self {
			ctx: Arc::new(ctx),
			store: TimelineStore::new(),
			events_tx,
			active: Mutex::new(None),
		};
		(engine, events_rx)
	}

	pub fn current_user(&self) -> &CurrentUser {
		&self.ctx.current_user
	}

	pub fn store(&self) -> &TimelineStore {
		&self.store
	}

	pub fn snapshot(&self, channel: &ChannelId) -> Arc<[Message]> {
		self.store.snapshot(channel)
	}

	pub fn connection_state(&self, channel: &ChannelId) -> Option<ConnectionState> {
		self.store.connection(channel)
	}

	pub async fn active_channel(&self) -> Option<ChannelId> {
		self.active.lock().await.as_ref().map(|a| a.channel.clone())
	}

	/// Select `channel` with the default capabilities of `kind`.
	pub async fn select_channel(&self, channel: ChannelId, kind: ChannelKind) -> u64 {
		self.select_channel_with(channel, kind, kind.capabilities()).await
	}

	/// Select `channel`, closing the previously active one first. Returns the new epoch.
	pub async fn select_channel_with(&self, channel: ChannelId, kind: ChannelKind, caps: Capabilities) -> u64 {
		let mut active = self.active.lock().await;
		if let Some(prev) = active.take() {
			self.close_active(prev).await;
		}

		let epoch = self.store.open(&channel);
		let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_COMMAND_CAPACITY);
		let (task_tx, task_rx) = mpsc::unbounded_channel();

		let actor = ChannelActor {
			channel: channel.clone(),
			kind,
			caps,
			epoch,
			ctx: Arc::clone(&self.ctx),
			store: self.store.clone(),
			events_tx: self.events_tx.clone(),
			receipts: ReadReceiptTracker::new(self.ctx.current_user.id.clone()),
			state: ConnectionState::default(),
			conn: None,
			attempt: 0,
			failures: 0,
			reconnect_deadline: None,
			last_open_at: None,
			opened_once: false,
			history_generation: 0,
			history_task: None,
			task_tx,
			task_rx,
		};
		let task = tokio::spawn(actor.run(cmd_rx));

		info!(channel = %channel, %kind, epoch, "channel selected");
		*active = Some(ActiveChannel {
			channel,
			epoch,
			cmd_tx,
			task,
		});
		epoch
	}

	/// Close the active channel, if any. Its connection is released before this returns.
	pub async fn deselect(&self) {
		let mut active = self.active.lock().await;
		if let Some(prev) = active.take() {
			self.close_active(prev).await;
		}
	}

	async fn close_active(&self, prev: ActiveChannel) {
		let (reply_tx, reply_rx) = oneshot::channel();
		let acked = prev.cmd_tx.send(ChannelCommand::Close { reply: reply_tx }).await.is_ok()
			&& matches!(timeout(CLOSE_TIMEOUT, reply_rx).await, Ok(Ok(())));
		if !acked {
			warn!(channel = %prev.channel, "channel task did not close in time; aborting");
			prev.task.abort();

			// the aborted task never published its own close
			let mut state = self.store.connection(&prev.channel).unwrap_or_default();
			if state.close(CloseReason::Deselected).is_ok() {
				self.store.set_connection(&prev.channel, prev.epoch, state.clone());
				let _ = self.events_tx.send(EngineEvent::Connection {
					channel: prev.channel.clone(),
					state,
				});
			}
		}
		self.store.close(&prev.channel, prev.epoch);
		info!(channel = %prev.channel, epoch = prev.epoch, "channel deselected");
	}

	/// Send `text` on the active channel. Returns the local id of the optimistic entry.
	pub async fn send(&self, text: impl Into<String>) -> Result<MessageId, CommandError> {
		let text = text.into();
		self.request(|reply| ChannelCommand::Send { text, reply }).await
	}

	pub async fn edit(&self, message_id: MessageId, text: impl Into<String>) -> Result<(), CommandError> {
		let text = text.into();
		self.request(|reply| ChannelCommand::Edit {
			message_id,
			text,
			reply,
		})
		.await
	}

	pub async fn delete(&self, message_id: MessageId) -> Result<(), CommandError> {
		self.request(|reply| ChannelCommand::Delete { message_id, reply }).await
	}

	async fn request<T>(
		&self,
		make: impl FnOnce(oneshot::Sender<Result<T, CommandError>>) -> ChannelCommand,
	) -> Result<T, CommandError> {
		let cmd_tx = {
			let active = self.active.lock().await;
			active
				.as_ref()
				.map(|a| a.cmd_tx.clone())
				.ok_or(CommandError::NoActiveChannel)?
		};

		let (reply_tx, reply_rx) = oneshot::channel();
		cmd_tx
			.send(make(reply_tx))
			.await
			.map_err(|_| CommandError::ChannelStopped)?;
		reply_rx.await.map_err(|_| CommandError::ChannelStopped)?
	}
}

async fn next_frame(conn: &mut Option<Box<dyn SocketConnection>>) -> Option<Result<String, TransportError>> {
	match conn.as_mut() {
		Some(c) => c.next_text().await,
		None => std::future::pending().await,
	}
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
	match deadline {
		Some(d) => tokio::time::sleep_until(d).await,
		None => std::future::pending().await,
	}
}

/// Owns one selected channel: its socket, reconnect schedule and timeline mutations.
struct ChannelActor {
	channel: ChannelId,
	kind: ChannelKind,
	caps: Capabilities,
	epoch: u64,
	ctx: Arc<EngineContext>,
	store: TimelineStore,
	events_tx: mpsc::UnboundedSender<EngineEvent>,
	receipts: ReadReceiptTracker,
	state: ConnectionState,
	conn: Option<Box<dyn SocketConnection>>,
	/// Backoff level; only a connection that stays healthy resets it.
	attempt: u32,
	/// Failed attempts since the last successful open.
	failures: u32,
	reconnect_deadline: Option<Instant>,
	last_open_at: Option<Instant>,
	opened_once: bool,
	history_generation: u64,
	history_task: Option<JoinHandle<()>>,
	task_tx: mpsc::UnboundedSender<TaskEvent>,
	task_rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl ChannelActor {
	async fn run(mut self, mut cmd_rx: mpsc::Receiver<ChannelCommand>) {
		self.start_history_fetch();
		self.connect().await;

		loop {
			let deadline = self.reconnect_deadline;
			tokio::select! {
				cmd = cmd_rx.recv() => {
					let Some(cmd) = cmd else {
						self.shutdown().await;
						break;
					};
					if !self.handle_command(cmd).await {
						break;
					}
				}

				frame = next_frame(&mut self.conn) => {
					match frame {
						Some(Ok(text)) => self.handle_text(&text).await,
						Some(Err(e)) => self.connection_lost(e.to_string()).await,
						None => self.connection_lost("closed by peer".to_string()).await,
					}
				}

				Some(ev) = self.task_rx.recv() => {
					self.handle_task_event(ev).await;
				}

				_ = sleep_until_deadline(deadline), if deadline.is_some() => {
					self.reconnect_deadline = None;
					self.connect().await;
				}
			}
		}

		if let Some(t) = self.history_task.take() {
			t.abort();
		}
		debug!(channel = %self.channel, epoch = self.epoch, "channel task ended");
	}

	fn publish_state(&self) {
		self.store.set_connection(&self.channel, self.epoch, self.state.clone());
		let _ = self.events_tx.send(EngineEvent::Connection {
			channel: self.channel.clone(),
			state: self.state.clone(),
		});
	}

	fn publish_timeline(&self) {
		let snapshot = self.store.snapshot(&self.channel);
		let _ = self.events_tx.send(EngineEvent::TimelineChanged {
			channel: self.channel.clone(),
			snapshot,
		});
	}

	fn start_history_fetch(&mut self) {
		if let Some(t) = self.history_task.take() {
			t.abort();
		}
		self.history_generation += 1;

		let generation = self.history_generation;
		let history = Arc::clone(&self.ctx.history);
		let tx = self.task_tx.clone();
		let channel = self.channel.clone();
		let kind = self.kind;
		let max_pages = self.ctx.settings.history_max_pages.max(1);

		self.history_task = Some(tokio::spawn(async move {
			let mut cursor = None;
			for _ in 0..max_pages {
				match history.fetch(&channel, kind, cursor).await {
					Ok(page) => {
						let next = page.next_cursor;
						if tx.send(TaskEvent::HistoryPage { generation, cursor, page }).is_err() {
							return;
						}
						match next {
							Some(n) if Some(n) != cursor => cursor = Some(n),
							_ => return,
						}
					}
					Err(error) => {
						let _ = tx.send(TaskEvent::HistoryFailed { generation, error });
						return;
					}
				}
			}
		}));
	}

	async fn connect(&mut self) {
		if let Some(mut old) = self.conn.take() {
			old.close().await;
		}

		if let Err(e) = self.state.begin_connect() {
			warn!(channel = %self.channel, error = %e, "connect skipped");
			return;
		}
		self.publish_state();

		let token = match self.ctx.auth.valid_token().await {
			Ok(t) => t,
			Err(e) => {
				warn!(channel = %self.channel, error = %e, "no valid token; closing channel");
				self.close_terminal(CloseReason::AuthFailed, e.to_string()).await;
				return;
			}
		};

		let url = channel_socket_url(&self.ctx.settings.ws_endpoint, &self.channel, self.kind, &token);
		debug!(
			channel = %self.channel,
			endpoint = %self.ctx.settings.ws_endpoint,
			path = %channel_socket_path(&self.channel, self.kind),
			attempt = self.attempt,
			"connecting"
		);

		let result = match timeout(self.ctx.settings.connect_timeout, self.ctx.transport.connect(&url)).await {
			Ok(r) => r,
			Err(_) => Err(TransportError::Timeout),
		};

		match result {
			Ok(conn) => {
				self.conn = Some(conn);
				if let Err(e) = self.state.opened() {
					warn!(channel = %self.channel, error = %e, "unexpected state on open");
				}
				self.state.retry_count = 0;
				self.failures = 0;
				self.last_open_at = Some(Instant::now());
				info!(channel = %self.channel, "channel connected");
				self.publish_state();

				// catch up on anything missed while disconnected
				if self.opened_once {
					self.start_history_fetch();
				}
				self.opened_once = true;
				self.acknowledge_unread().await;
			}
			Err(e) => {
				warn!(channel = %self.channel, error = %e, "connect failed");
				self.connection_lost(e.to_string()).await;
			}
		}
	}

	/// Unexpected loss: fail pending sends and schedule the next attempt.
	async fn connection_lost(&mut self, error: String) {
		self.conn = None;

		if self.store.fail_all_pending(&self.channel) > 0 {
			self.publish_timeline();
		}

		let policy = self.ctx.settings.reconnect;
		self.attempt = policy.next_attempt(self.attempt, self.last_open_at.take());
		self.failures = self.failures.saturating_add(1);
		metrics::counter!("classchat_reconnect_attempts_total").increment(1);

		if policy.exhausted(self.failures) {
			warn!(channel = %self.channel, attempts = self.failures - 1, error = %error, "giving up reconnecting");
			self.close_terminal(CloseReason::RetriesExhausted, error).await;
			return;
		}

		if let Err(e) = self.state.lost(self.failures, error.clone()) {
			warn!(channel = %self.channel, error = %e, "cannot schedule reconnect");
			return;
		}

		let (deadline, delay) = policy.schedule(self.attempt);
		self.reconnect_deadline = Some(deadline);
		warn!(
			channel = %self.channel,
			attempt = self.attempt,
			delay_ms = delay.as_millis() as u64,
			error = %error,
			"connection lost; reconnecting"
		);
		self.publish_state();
	}

	async fn close_terminal(&mut self, reason: CloseReason, error: String) {
		self.reconnect_deadline = None;
		if let Some(mut conn) = self.conn.take() {
			conn.close().await;
		}
		if self.store.fail_all_pending(&self.channel) > 0 {
			self.publish_timeline();
		}

		self.state.last_error = Some(error);
		if let Err(e) = self.state.close(reason) {
			warn!(channel = %self.channel, error = %e, "close rejected");
			return;
		}
		info!(channel = %self.channel, ?reason, "channel connection closed");
		self.publish_state();
	}

	async fn shutdown(&mut self) {
		self.reconnect_deadline = None;
		if let Some(t) = self.history_task.take() {
			t.abort();
		}

		if self.state.is_open() {
			match self.state.transition(ConnectionStatus::Closing) {
				Ok(()) => self.publish_state(),
				Err(e) => warn!(channel = %self.channel, error = %e, "close rejected"),
			}
		}
		if let Some(mut conn) = self.conn.take() {
			conn.close().await;
		}

		if !self.state.is_closed() {
			match self.state.transition(ConnectionStatus::Closed) {
				Ok(()) => {
					self.state.close_reason = Some(CloseReason::Deselected);
					self.publish_state();
				}
				Err(e) => warn!(channel = %self.channel, error = %e, "close rejected"),
			}
		}
	}

	/// Returns false once the task should stop.
	async fn handle_command(&mut self, cmd: ChannelCommand) -> bool {
		match cmd {
			ChannelCommand::Send { text, reply } => {
				let result = self.send_message(text).await;
				let _ = reply.send(result);
			}
			ChannelCommand::Edit {
				message_id,
				text,
				reply,
			} => {
				let result = self.edit_message(message_id, text).await;
				let _ = reply.send(result);
			}
			ChannelCommand::Delete { message_id, reply } => {
				self.delete_message(message_id, reply).await;
			}
			ChannelCommand::Close { reply } => {
				self.shutdown().await;
				let _ = reply.send(());
				return false;
			}
		}
		true
	}

	async fn send_frame(&mut self, frame: &OutboundFrame) -> Result<(), CommandError> {
		if !self.state.is_open() {
			return Err(CommandError::NotConnected);
		}
		let Some(conn) = self.conn.as_mut() else {
			return Err(CommandError::NotConnected);
		};

		let text = encode_frame(frame, self.ctx.settings.max_frame_bytes)?;
		if let Err(e) = conn.send_text(text).await {
			let error = e.to_string();
			self.connection_lost(error.clone()).await;
			return Err(CommandError::Transport(error));
		}
		debug!(channel = %self.channel, kind = frame.kind(), "frame sent");
		Ok(())
	}

	async fn send_message(&mut self, text: String) -> Result<MessageId, CommandError> {
		check_text(&text)?;
		if !self.state.is_open() {
			return Err(CommandError::NotConnected);
		}

		let ctx = Arc::clone(&self.ctx);
		let me = &ctx.current_user;
		let client_id = new_client_message_id();
		let local_id = MessageId::new(client_id.as_str())?;
		let frame = OutboundCommand::Send { text: text.clone() }.to_frame(&me.id, Some(&client_id));

		let pending = Message {
			id: local_id.clone(),
			channel_id: self.channel.clone(),
			content: text,
			sender_id: me.id.clone(),
			sender_display_name: me.display_name.clone(),
			timestamp: chrono::Utc::now(),
			read_by: vec![me.id.clone()],
			delivery_state: DeliveryState::Pending,
			client_message_id: Some(client_id.clone()),
		};
		self.store.insert_pending(&self.channel, pending);
		self.publish_timeline();

		if let Err(e) = self.send_frame(&frame).await {
			// a lost connection has already failed every pending entry
			if self.store.fail_pending(&self.channel, &client_id) {
				self.publish_timeline();
			}
			return Err(e);
		}
		Ok(local_id)
	}

	async fn edit_message(&mut self, message_id: MessageId, text: String) -> Result<(), CommandError> {
		let ctx = Arc::clone(&self.ctx);
		let current = self.store.get(&self.channel, &message_id);
		check_edit(&self.caps, current.as_ref(), &message_id, &text, &ctx.current_user.id)?;

		let frame = OutboundCommand::Edit { message_id, text }.to_frame(&ctx.current_user.id, None);
		self.send_frame(&frame).await
	}

	async fn delete_message(&mut self, message_id: MessageId, reply: oneshot::Sender<Result<(), CommandError>>) {
		let current = self.store.get(&self.channel, &message_id);
		if let Err(e) = check_delete(&self.caps, current.as_ref(), &message_id, &self.ctx.current_user.id) {
			let _ = reply.send(Err(e));
			return;
		}

		match self.caps.delete_transport {
			DeleteTransport::Socket => {
				let frame = OutboundCommand::Delete { message_id }.to_frame(&self.ctx.current_user.id, None);
				let result = self.send_frame(&frame).await;
				let _ = reply.send(result);
			}
			DeleteTransport::Request => {
				let history = Arc::clone(&self.ctx.history);
				let tx = self.task_tx.clone();
				let channel = self.channel.clone();
				let kind = self.kind;
				tokio::spawn(async move {
					let result = history.delete_message(&channel, kind, &message_id).await;
					let _ = tx.send(TaskEvent::DeleteDone {
						message_id,
						result,
						reply,
					});
				});
			}
		}
	}

	async fn send_receipt(&mut self, id: MessageId) {
		let frame = self.receipts.receipt_frame(&id);
		match self.send_frame(&frame).await {
			Ok(()) => {
				self.receipts.record_sent(id);
				metrics::counter!("classchat_read_receipts_sent_total").increment(1);
			}
			Err(e) => debug!(channel = %self.channel, message_id = %id, error = %e, "read receipt dropped"),
		}
	}

	/// Acknowledge unread messages from others, while open.
	async fn acknowledge_unread(&mut self) {
		if !self.state.is_open() {
			return;
		}
		let snapshot = self.store.snapshot(&self.channel);
		for id in self.receipts.unacknowledged(&snapshot) {
			if !self.state.is_open() {
				break;
			}
			self.send_receipt(id).await;
		}
	}

	fn drop_frame(&self, kind: &str, error: &dyn std::fmt::Display) {
		metrics::counter!("classchat_frames_dropped_total").increment(1);
		warn!(channel = %self.channel, kind, error = %error, "dropping inbound frame");
	}

	async fn handle_text(&mut self, text: &str) {
		let frame = match decode_frame(text, self.ctx.settings.max_frame_bytes) {
			Ok(f) => f,
			Err(e) => {
				self.drop_frame("undecodable", &e);
				return;
			}
		};

		let ctx = Arc::clone(&self.ctx);
		let me = &ctx.current_user.id;
		match frame {
			InboundFrame::Message(raw) => {
				let message = match map_raw_message(&self.channel, raw, me) {
					Ok(m) => m,
					Err(e) => {
						self.drop_frame("message", &e);
						return;
					}
				};
				let id = message.id.clone();
				let outcome = match message.client_message_id.clone() {
					Some(cid) => self.store.confirm_pending(&self.channel, &cid, message, me),
					None => self.store.append_live(&self.channel, message, me),
				};
				if outcome.changed() {
					self.publish_timeline();
				}
				if let Some(stored) = self.store.get(&self.channel, &id)
					&& self.receipts.needs_receipt(&stored)
				{
					self.send_receipt(id).await;
				}
			}
			InboundFrame::ReadReceipt(ev) => match self.receipts.apply_event(&self.store, &self.channel, &ev) {
				Ok(true) => self.publish_timeline(),
				Ok(false) => {}
				Err(e) => self.drop_frame("read_receipt", &e),
			},
			InboundFrame::Edit(ev) => match self.apply_edit(ev) {
				Ok(true) => self.publish_timeline(),
				Ok(false) => debug!(channel = %self.channel, "edit ignored"),
				Err(e) => self.drop_frame("edit", &e),
			},
			InboundFrame::Delete(ev) => match MessageId::new(&ev.message_id) {
				Ok(id) => {
					if self.store.remove(&self.channel, &id) {
						self.publish_timeline();
					}
					self.receipts.forget(&id);
				}
				Err(e) => self.drop_frame("delete", &e),
			},
		}
	}

	fn apply_edit(&self, ev: EditEvent) -> Result<bool, classchat_domain::ParseIdError> {
		let id = MessageId::new(&ev.message_id)?;
		let timestamp = parse_timestamp(&ev.timestamp)?;
		let readers = ev
			.read_by
			.iter()
			.flatten()
			.filter_map(|r| UserId::new(r).ok())
			.collect();
		Ok(self.store.apply_edit(&self.channel, &id, ev.content, timestamp, readers))
	}

	async fn handle_task_event(&mut self, ev: TaskEvent) {
		match ev {
			TaskEvent::HistoryPage {
				generation,
				cursor,
				page,
			} => {
				if generation != self.history_generation {
					return;
				}
				let ctx = Arc::clone(&self.ctx);
				let Some(mut outcome) = self
					.store
					.seed(&self.channel, self.epoch, page.messages, &ctx.current_user.id)
				else {
					debug!(channel = %self.channel, "discarding history for a closed timeline");
					return;
				};
				outcome.skipped += page.skipped;
				self.store.set_history_cursor(&self.channel, self.epoch, cursor);
				debug!(
					channel = %self.channel,
					inserted = outcome.inserted,
					updated = outcome.updated,
					skipped = outcome.skipped,
					"history merged"
				);
				if outcome.changed() {
					self.publish_timeline();
				}
				self.acknowledge_unread().await;
			}
			TaskEvent::HistoryFailed { generation, error } => {
				if generation != self.history_generation {
					return;
				}
				match error {
					HistoryError::Auth(e) => {
						warn!(channel = %self.channel, error = %e, "history auth failed; closing channel");
						self.close_terminal(CloseReason::AuthFailed, e.to_string()).await;
					}
					other => {
						warn!(channel = %self.channel, error = %other, "history fetch failed");
						let _ = self.events_tx.send(EngineEvent::HistoryFailed {
							channel: self.channel.clone(),
							error: other.to_string(),
						});
					}
				}
			}
			TaskEvent::DeleteDone {
				message_id,
				result,
				reply,
			} => match result {
				Ok(()) => {
					if self.store.remove(&self.channel, &message_id) {
						self.publish_timeline();
					}
					self.receipts.forget(&message_id);
					let _ = reply.send(Ok(()));
				}
				Err(e) => {
					warn!(channel = %self.channel, message_id = %message_id, error = %e, "delete request failed");
					let _ = reply.send(Err(CommandError::Request(e)));
				}
			},
		}
	}
}
