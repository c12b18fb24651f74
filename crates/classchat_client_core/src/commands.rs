#![forbid(unsafe_code)]

use classchat_domain::{Capabilities, DeliveryState, Message, MessageId, ParseIdError, UserId};
use classchat_protocol::{CodecError, OutboundFrame};
use thiserror::Error;

use crate::auth::AuthError;
use crate::history::HistoryError;

#[derive(Debug, Error)]
pub enum CommandError {
	#[error("not connected")]
	NotConnected,

	#[error("no channel selected")]
	NoActiveChannel,

	#[error("message is empty")]
	EmptyMessage,

	#[error("{0} is not supported on this channel")]
	NotSupported(&'static str),

	#[error("message {0} is not editable")]
	NotEditable(MessageId),

	#[error("message {0} cannot be deleted")]
	NotDeletable(MessageId),

	#[error("unknown message {0}")]
	UnknownMessage(MessageId),

	#[error("invalid id: {0}")]
	InvalidId(#[from] ParseIdError),

	#[error("encode failed: {0}")]
	Codec(#[from] CodecError),

	#[error("send failed: {0}")]
	Transport(String),

	#[error(transparent)]
	Auth(#[from] AuthError),

	#[error("delete request failed: {0}")]
	Request(#[from] HistoryError),

	#[error("channel task stopped")]
	ChannelStopped,
}

/// User-initiated outbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
	Send { text: String },
	Edit { message_id: MessageId, text: String },
	Delete { message_id: MessageId },
	ReadReceipt { message_id: MessageId },
}

impl OutboundCommand {
	pub const fn kind(&self) -> &'static str {
		match self {
			OutboundCommand::Send { .. } => "send",
			OutboundCommand::Edit { .. } => "edit",
			OutboundCommand::Delete { .. } => "delete",
			OutboundCommand::ReadReceipt { .. } => "read_receipt",
		}
	}

	/// Wire frame for this command sent by `sender`.
	pub fn to_frame(&self, sender: &UserId, client_message_id: Option<&str>) -> OutboundFrame {
		match self {
			OutboundCommand::Send { text } => OutboundFrame::Send {
				message: text.clone(),
				sender_id: sender.to_string(),
				client_message_id: client_message_id.map(str::to_string),
			},
			OutboundCommand::Edit { message_id, text } => OutboundFrame::Edit {
				message_id: message_id.to_string(),
				message: text.clone(),
				sender_id: sender.to_string(),
			},
			OutboundCommand::Delete { message_id } => OutboundFrame::Delete {
				message_id: message_id.to_string(),
			},
			OutboundCommand::ReadReceipt { message_id } => OutboundFrame::ReadReceipt {
				message_id: message_id.to_string(),
			},
		}
	}
}

/// Fresh correlation id for an optimistic send.
pub fn new_client_message_id() -> String {
	format!("local-{}", uuid::Uuid::new_v4())
}

pub fn check_text(text: &str) -> Result<(), CommandError> {
	if text.trim().is_empty() {
		return Err(CommandError::EmptyMessage);
	}
	Ok(())
}

enum Authorship {
	Missing,
	NotOwn,
	Own,
}

/// Only confirmed messages of the current user can be changed.
fn authorship(message: Option<&Message>, current_user: &UserId) -> Authorship {
	match message {
		None => Authorship::Missing,
		Some(m) if m.is_own(current_user) && m.delivery_state == DeliveryState::Confirmed => Authorship::Own,
		Some(_) => Authorship::NotOwn,
	}
}

/// Local validation for `edit`.
pub fn check_edit(
	caps: &Capabilities,
	message: Option<&Message>,
	id: &MessageId,
	text: &str,
	current_user: &UserId,
) -> Result<(), CommandError> {
	if !caps.can_edit {
		return Err(CommandError::NotSupported("edit"));
	}
	match authorship(message, current_user) {
		Authorship::Own => {}
		Authorship::Missing => return Err(CommandError::UnknownMessage(id.clone())),
		Authorship::NotOwn => return Err(CommandError::NotEditable(id.clone())),
	}
	check_text(text)
}

/// Local validation for `delete`.
pub fn check_delete(
	caps: &Capabilities,
	message: Option<&Message>,
	id: &MessageId,
	current_user: &UserId,
) -> Result<(), CommandError> {
	if !caps.can_delete {
		return Err(CommandError::NotSupported("delete"));
	}
	match authorship(message, current_user) {
		Authorship::Own => Ok(()),
		Authorship::Missing => Err(CommandError::UnknownMessage(id.clone())),
		Authorship::NotOwn => Err(CommandError::NotDeletable(id.clone())),
	}
}

#[cfg(test)]
mod tests {
	use classchat_domain::{ChannelId, ChannelKind, parse_timestamp};

	use super::*;

	fn msg(id: &str, sender: &str) -> Message {
		Message {
			id: MessageId::new(id).unwrap(),
			channel_id: ChannelId::new("C1").unwrap(),
			content: "x".to_string(),
			sender_id: UserId::new(sender).unwrap(),
			sender_display_name: sender.to_string(),
			timestamp: parse_timestamp("2024-05-01T10:00:00Z").unwrap(),
			read_by: Vec::new(),
			delivery_state: DeliveryState::Confirmed,
			client_message_id: None,
		}
	}

	#[test]
	fn empty_text_is_rejected() {
		assert!(matches!(check_text("  \n"), Err(CommandError::EmptyMessage)));
		assert!(check_text("hi").is_ok());
	}

	#[test]
	fn edit_requires_capability_and_ownership() {
		let me = UserId::new("42").unwrap();
		let id = MessageId::new("m1").unwrap();
		let own = msg("m1", "42");
		let theirs = msg("m1", "43");
		let discussion = ChannelKind::Discussion.capabilities();

		assert!(matches!(
			check_edit(&ChannelKind::Classroom.capabilities(), Some(&own), &id, "v2", &me),
			Err(CommandError::NotSupported("edit"))
		));
		assert!(matches!(
			check_edit(&discussion, Some(&theirs), &id, "v2", &me),
			Err(CommandError::NotEditable(_))
		));
		assert!(matches!(
			check_edit(&discussion, None, &id, "v2", &me),
			Err(CommandError::UnknownMessage(_))
		));
		assert!(matches!(
			check_edit(&discussion, Some(&own), &id, " ", &me),
			Err(CommandError::EmptyMessage)
		));
		assert!(check_edit(&discussion, Some(&own), &id, "v2", &me).is_ok());

		let mut pending = own.clone();
		pending.delivery_state = DeliveryState::Pending;
		assert!(matches!(
			check_edit(&discussion, Some(&pending), &id, "v2", &me),
			Err(CommandError::NotEditable(_))
		));
	}

	#[test]
	fn delete_requires_capability_and_ownership() {
		let me = UserId::new("42").unwrap();
		let id = MessageId::new("m1").unwrap();
		let discussion = ChannelKind::Discussion.capabilities();

		assert!(matches!(
			check_delete(&Capabilities::default(), Some(&msg("m1", "42")), &id, &me),
			Err(CommandError::NotSupported("delete"))
		));
		assert!(matches!(
			check_delete(&discussion, Some(&msg("m1", "7")), &id, &me),
			Err(CommandError::NotDeletable(_))
		));
		assert!(check_delete(&discussion, Some(&msg("m1", "42")), &id, &me).is_ok());
	}

	#[test]
	fn commands_map_to_frames() {
		let me = UserId::new("42").unwrap();
		let send = OutboundCommand::Send { text: "hi".to_string() };
		assert_eq!(
			send.to_frame(&me, Some("local-1")),
			OutboundFrame::Send {
				message: "hi".to_string(),
				sender_id: "42".to_string(),
				client_message_id: Some("local-1".to_string()),
			}
		);
		let edit = OutboundCommand::Edit {
			message_id: MessageId::new("m1").unwrap(),
			text: "v2".to_string(),
		};
		assert_eq!(edit.to_frame(&me, None).kind(), "edit");
		assert_eq!(edit.kind(), "edit");
		assert!(new_client_message_id().starts_with("local-"));
	}
}
