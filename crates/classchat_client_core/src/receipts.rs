#![forbid(unsafe_code)]

use std::collections::HashSet;

use classchat_domain::{ChannelId, DeliveryState, Message, MessageId, ParseIdError, UserId};
use classchat_protocol::{OutboundFrame, ReadReceiptEvent};

use crate::commands::OutboundCommand;
use crate::timeline::TimelineStore;

/// Decides which messages the current user acknowledges, at most once per channel lifetime.
#[derive(Debug, Clone)]
pub struct ReadReceiptTracker {
	current_user: UserId,
	acknowledged: HashSet<MessageId>,
}

impl ReadReceiptTracker {
	pub fn new(current_user: UserId) -> Self {
		Self {
			current_user,
			acknowledged: HashSet::new(),
		}
	}

	/// Whether `message` still needs an outbound receipt.
	pub fn needs_receipt(&self, message: &Message) -> bool {
		message.delivery_state == DeliveryState::Confirmed
			&& !message.is_own(&self.current_user)
			&& !message.is_read_by(&self.current_user)
			&& !self.acknowledged.contains(&message.id)
	}

	/// Ids in `messages` that still need a receipt, in timeline order.
	pub fn unacknowledged(&self, messages: &[Message]) -> Vec<MessageId> {
		messages
			.iter()
			.filter(|m| self.needs_receipt(m))
			.map(|m| m.id.clone())
			.collect()
	}

	pub fn receipt_frame(&self, id: &MessageId) -> OutboundFrame {
		OutboundCommand::ReadReceipt { message_id: id.clone() }.to_frame(&self.current_user, None)
	}

	/// Record that a receipt for `id` went out.
	pub fn record_sent(&mut self, id: MessageId) {
		self.acknowledged.insert(id);
	}

	pub fn forget(&mut self, id: &MessageId) {
		self.acknowledged.remove(id);
	}

	pub fn acknowledged_count(&self) -> usize {
		self.acknowledged.len()
	}

	/// Apply an inbound `read_receipt` event to the store.
	pub fn apply_event(
		&self,
		store: &TimelineStore,
		channel: &ChannelId,
		event: &ReadReceiptEvent,
	) -> Result<bool, ParseIdError> {
		let id = MessageId::new(&event.message_id)?;
		let reader = UserId::new(&event.reader_id)?;
		Ok(store.mark_read(channel, &id, reader))
	}
}
