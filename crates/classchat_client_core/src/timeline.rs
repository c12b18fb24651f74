#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use classchat_domain::{ChannelId, DeliveryState, Message, MessageId, ParseIdError, Timestamp, UserId, parse_timestamp};
use classchat_protocol::RawMessage;
use parking_lot::RwLock;
use tracing::warn;

use crate::connection::ConnectionState;

/// Map a wire message into a timeline entry for `channel`.
///
/// Own messages, and messages the server flags as already read, count as read
/// by the current user.
pub fn map_raw_message(channel: &ChannelId, raw: RawMessage, current_user: &UserId) -> Result<Message, ParseIdError> {
	let id = MessageId::new(&raw.id)?;
	let sender_id = UserId::new(&raw.sender_id)?;
	let timestamp = parse_timestamp(&raw.timestamp)?;

	let mut read_by: Vec<UserId> = Vec::new();
	for reader in raw.read_by.iter().flatten() {
		if let Ok(reader) = UserId::new(reader)
			&& !read_by.contains(&reader)
		{
			read_by.push(reader);
		}
	}

	let sender_display_name = raw
		.sender_name
		.filter(|s| !s.trim().is_empty())
		.unwrap_or_else(|| sender_id.to_string());

	let mut message = Message {
		id,
		channel_id: channel.clone(),
		content: raw.content,
		sender_id,
		sender_display_name,
		timestamp,
		read_by,
		delivery_state: DeliveryState::Confirmed,
		client_message_id: raw.client_message_id.filter(|s| !s.trim().is_empty()),
	};
	if raw.read_by_current_user || message.is_own(current_user) {
		message.add_reader(current_user.clone());
	}
	Ok(message)
}

/// Result of merging one message into a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
	Inserted,
	/// Existing entry updated by a newer server copy.
	Replaced,
	/// A pending optimistic entry was replaced by its server echo.
	Confirmed,
	Unchanged,
}

impl MergeOutcome {
	pub fn changed(self) -> bool {
		self != MergeOutcome::Unchanged
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedOutcome {
	pub inserted: usize,
	pub updated: usize,
	pub skipped: usize,
}

impl SeedOutcome {
	pub fn changed(&self) -> bool {
		self.inserted > 0 || self.updated > 0
	}
}

/// Messages of one open channel, sorted by `(timestamp, id)` and unique by id.
#[derive(Debug, Clone)]
pub struct ChannelTimeline {
	pub channel_id: ChannelId,
	pub epoch: u64,
	pub last_seen_history_cursor: Option<u32>,
	pub connection: ConnectionState,
	messages: Vec<Message>,
}

impl ChannelTimeline {
	pub fn new(channel_id: ChannelId, epoch: u64) -> Self {
		Self {
			channel_id,
			epoch,
			last_seen_history_cursor: None,
			connection: ConnectionState::default(),
			messages: Vec::new(),
		}
	}

	pub fn messages(&self) -> &[Message] {
		&self.messages
	}

	pub fn len(&self) -> usize {
		self.messages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty()
	}

	pub fn get(&self, id: &MessageId) -> Option<&Message> {
		self.messages.iter().find(|m| &m.id == id)
	}

	fn position(&self, id: &MessageId) -> Option<usize> {
		self.messages.iter().position(|m| &m.id == id)
	}

	fn insert_sorted(&mut self, message: Message) {
		let pos = {
			let key = message.sort_key();
			self.messages.partition_point(|m| m.sort_key() < key)
		};
		self.messages.insert(pos, message);
	}

	/// Oldest unconfirmed entry this server copy stands for.
	fn pending_position(&self, incoming: &Message, current_user: &UserId) -> Option<usize> {
		let unconfirmed = |m: &Message| m.delivery_state != DeliveryState::Confirmed;

		if let Some(cid) = incoming.client_message_id.as_deref()
			&& let Some(pos) = self
				.messages
				.iter()
				.position(|m| unconfirmed(m) && m.client_message_id.as_deref() == Some(cid))
		{
			return Some(pos);
		}

		if !incoming.is_own(current_user) || self.position(&incoming.id).is_some() {
			return None;
		}

		self.messages
			.iter()
			.position(|m| unconfirmed(m) && m.is_own(current_user) && m.content == incoming.content)
	}

	/// Insert or update by id.
	///
	/// A confirmed entry is only replaced by a strictly newer copy; readers are
	/// always unioned so read state never regresses.
	pub fn upsert(&mut self, mut incoming: Message, current_user: &UserId) -> MergeOutcome {
		if let Some(pos) = self.pending_position(&incoming, current_user) {
			let pending = self.messages.remove(pos);
			for reader in pending.read_by {
				incoming.add_reader(reader);
			}
			if let Some(dup) = self.position(&incoming.id) {
				let dup = self.messages.remove(dup);
				for reader in dup.read_by {
					incoming.add_reader(reader);
				}
			}
			self.insert_sorted(incoming);
			return MergeOutcome::Confirmed;
		}

		let Some(pos) = self.position(&incoming.id) else {
			self.insert_sorted(incoming);
			return MergeOutcome::Inserted;
		};

		let existing = &mut self.messages[pos];
		if existing.delivery_state == DeliveryState::Confirmed && incoming.timestamp <= existing.timestamp {
			let mut changed = false;
			for reader in incoming.read_by {
				changed |= existing.add_reader(reader);
			}
			return if changed {
				MergeOutcome::Replaced
			} else {
				MergeOutcome::Unchanged
			};
		}

		let existing = self.messages.remove(pos);
		let supplied = std::mem::replace(&mut incoming.read_by, existing.read_by);
		for reader in supplied {
			incoming.add_reader(reader);
		}
		if incoming.client_message_id.is_none() {
			incoming.client_message_id = existing.client_message_id;
		}
		self.insert_sorted(incoming);
		MergeOutcome::Replaced
	}

	/// Merge a history batch. Unparseable entries are skipped.
	pub fn seed(&mut self, batch: Vec<RawMessage>, current_user: &UserId) -> SeedOutcome {
		let mut outcome = SeedOutcome::default();
		for raw in batch {
			let message = match map_raw_message(&self.channel_id, raw, current_user) {
				Ok(m) => m,
				Err(e) => {
					warn!(channel = %self.channel_id, error = %e, "skipping unparseable history entry");
					outcome.skipped += 1;
					continue;
				}
			};
			match self.upsert(message, current_user) {
				MergeOutcome::Inserted => outcome.inserted += 1,
				MergeOutcome::Replaced | MergeOutcome::Confirmed => outcome.updated += 1,
				MergeOutcome::Unchanged => {}
			}
		}
		outcome
	}

	/// Authoritative edit. Unknown ids and older edits are ignored.
	pub fn apply_edit(&mut self, id: &MessageId, content: String, timestamp: Timestamp, readers: Vec<UserId>) -> bool {
		let Some(pos) = self.position(id) else {
			return false;
		};
		let existing = &self.messages[pos];
		if timestamp < existing.timestamp {
			return false;
		}
		if timestamp == existing.timestamp && existing.content == content && readers.iter().all(|r| existing.is_read_by(r))
		{
			return false;
		}

		let mut message = self.messages.remove(pos);
		message.content = content;
		message.timestamp = timestamp;
		message.delivery_state = DeliveryState::Confirmed;
		for reader in readers {
			message.add_reader(reader);
		}
		self.insert_sorted(message);
		true
	}

	pub fn remove(&mut self, id: &MessageId) -> bool {
		match self.position(id) {
			Some(pos) => {
				self.messages.remove(pos);
				true
			}
			None => false,
		}
	}

	/// Idempotent; a missing message is ignored.
	pub fn mark_read(&mut self, id: &MessageId, reader: UserId) -> bool {
		match self.position(id) {
			Some(pos) => self.messages[pos].add_reader(reader),
			None => false,
		}
	}

	pub fn insert_pending(&mut self, message: Message) {
		debug_assert_eq!(message.delivery_state, DeliveryState::Pending);
		self.insert_sorted(message);
	}

	/// Replace the pending entry `client_message_id` with its server copy.
	pub fn confirm_pending(&mut self, client_message_id: &str, mut confirmed: Message, current_user: &UserId) -> MergeOutcome {
		confirmed.client_message_id = Some(client_message_id.to_string());
		confirmed.delivery_state = DeliveryState::Confirmed;
		self.upsert(confirmed, current_user)
	}

	pub fn fail_pending(&mut self, client_message_id: &str) -> bool {
		let entry = self.messages.iter_mut().find(|m| {
			m.delivery_state == DeliveryState::Pending && m.client_message_id.as_deref() == Some(client_message_id)
		});
		match entry {
			Some(m) => {
				m.delivery_state = DeliveryState::Failed;
				true
			}
			None => false,
		}
	}

	/// Mark every pending entry failed. Returns how many changed.
	pub fn fail_all_pending(&mut self) -> usize {
		let mut n = 0;
		for m in self.messages.iter_mut().filter(|m| m.delivery_state == DeliveryState::Pending) {
			m.delivery_state = DeliveryState::Failed;
			n += 1;
		}
		n
	}
}

/// All open channel timelines.
///
/// Cheap to clone; readers take snapshots while the owning channel task mutates.
#[derive(Debug, Clone, Default)]
pub struct TimelineStore {
	inner: Arc<RwLock<HashMap<ChannelId, ChannelTimeline>>>,
	next_epoch: Arc<AtomicU64>,
}

impl TimelineStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a fresh timeline for `channel`, replacing any previous one.
	pub fn open(&self, channel: &ChannelId) -> u64 {
		let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed) + 1;
		self.inner
			.write()
			.insert(channel.clone(), ChannelTimeline::new(channel.clone(), epoch));
		epoch
	}

	/// Tear down `channel` if it still belongs to `epoch`.
	pub fn close(&self, channel: &ChannelId, epoch: u64) -> bool {
		let mut guard = self.inner.write();
		if guard.get(channel).is_some_and(|t| t.epoch == epoch) {
			guard.remove(channel);
			return true;
		}
		false
	}

	pub fn contains(&self, channel: &ChannelId) -> bool {
		self.inner.read().contains_key(channel)
	}

	/// Run `f` against the timeline of `channel`, if open.
	pub fn update<R>(&self, channel: &ChannelId, f: impl FnOnce(&mut ChannelTimeline) -> R) -> Option<R> {
		self.inner.write().get_mut(channel).map(f)
	}

	/// Merge a history batch. Results for a stale `epoch` are discarded (`None`).
	pub fn seed(
		&self,
		channel: &ChannelId,
		epoch: u64,
		batch: Vec<RawMessage>,
		current_user: &UserId,
	) -> Option<SeedOutcome> {
		let mut guard = self.inner.write();
		let timeline = guard.get_mut(channel).filter(|t| t.epoch == epoch)?;
		Some(timeline.seed(batch, current_user))
	}

	pub fn append_live(&self, channel: &ChannelId, message: Message, current_user: &UserId) -> MergeOutcome {
		self.update(channel, |t| t.upsert(message, current_user))
			.unwrap_or(MergeOutcome::Unchanged)
	}

	pub fn apply_edit(
		&self,
		channel: &ChannelId,
		id: &MessageId,
		content: String,
		timestamp: Timestamp,
		readers: Vec<UserId>,
	) -> bool {
		self.update(channel, |t| t.apply_edit(id, content, timestamp, readers))
			.unwrap_or(false)
	}

	pub fn remove(&self, channel: &ChannelId, id: &MessageId) -> bool {
		self.update(channel, |t| t.remove(id)).unwrap_or(false)
	}

	pub fn mark_read(&self, channel: &ChannelId, id: &MessageId, reader: UserId) -> bool {
		self.update(channel, |t| t.mark_read(id, reader)).unwrap_or(false)
	}

	pub fn insert_pending(&self, channel: &ChannelId, message: Message) -> bool {
		self.update(channel, |t| t.insert_pending(message)).is_some()
	}

	pub fn confirm_pending(
		&self,
		channel: &ChannelId,
		client_message_id: &str,
		confirmed: Message,
		current_user: &UserId,
	) -> MergeOutcome {
		self.update(channel, |t| t.confirm_pending(client_message_id, confirmed, current_user))
			.unwrap_or(MergeOutcome::Unchanged)
	}

	pub fn fail_pending(&self, channel: &ChannelId, client_message_id: &str) -> bool {
		self.update(channel, |t| t.fail_pending(client_message_id))
			.unwrap_or(false)
	}

	pub fn fail_all_pending(&self, channel: &ChannelId) -> usize {
		self.update(channel, |t| t.fail_all_pending()).unwrap_or(0)
	}

	/// Immutable copy of the current messages; empty for an unknown channel.
	pub fn snapshot(&self, channel: &ChannelId) -> Arc<[Message]> {
		match self.inner.read().get(channel) {
			Some(t) => Arc::from(t.messages()),
			None => Arc::from(Vec::new()),
		}
	}

	pub fn get(&self, channel: &ChannelId, id: &MessageId) -> Option<Message> {
		self.inner.read().get(channel).and_then(|t| t.get(id).cloned())
	}

	pub fn connection(&self, channel: &ChannelId) -> Option<ConnectionState> {
		self.inner.read().get(channel).map(|t| t.connection.clone())
	}

	pub fn set_connection(&self, channel: &ChannelId, epoch: u64, state: ConnectionState) {
		let mut guard = self.inner.write();
		if let Some(t) = guard.get_mut(channel).filter(|t| t.epoch == epoch) {
			t.connection = state;
		}
	}

	pub fn set_history_cursor(&self, channel: &ChannelId, epoch: u64, cursor: Option<u32>) {
		let mut guard = self.inner.write();
		if let Some(t) = guard.get_mut(channel).filter(|t| t.epoch == epoch) {
			t.last_seen_history_cursor = cursor;
		}
	}
}
