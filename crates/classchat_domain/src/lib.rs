#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ident;
pub mod message;

pub use ident::{IdRepr, RawId, ids_equal};
pub use message::{DeliveryState, Message, OriginClass, Timestamp, parse_timestamp};

/// Errors for parsing identifiers and wire values from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown channel kind: {0}")]
	UnknownKind(String),
	#[error("invalid timestamp: {0}")]
	InvalidTimestamp(String),
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

macro_rules! canonical_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			/// Build from any id representation; blank ids are rejected.
			pub fn new(id: impl IdRepr) -> Result<Self, ParseIdError> {
				id.canonical().map(Self).ok_or(ParseIdError::Empty)
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl IdRepr for $name {
			fn canonical(&self) -> Option<String> {
				Some(self.0.clone())
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl FromStr for $name {
			type Err = ParseIdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

canonical_id!(
	/// Classroom-scoped conversation identifier (the classroom id).
	ChannelId
);
canonical_id!(
	/// Message identifier, stable across history fetch and live delivery.
	MessageId
);
canonical_id!(
	/// User identifier.
	UserId
);

/// The two chat flavours a classroom exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
	/// Private classroom chat: send + read receipts only.
	#[default]
	Classroom,
	/// Forum-style discussion: send, edit and delete.
	Discussion,
}

impl ChannelKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			ChannelKind::Classroom => "classroom",
			ChannelKind::Discussion => "discussion",
		}
	}

	/// Default capability set for this kind.
	pub const fn capabilities(self) -> Capabilities {
		match self {
			ChannelKind::Classroom => Capabilities {
				can_edit: false,
				can_delete: false,
				delete_transport: DeleteTransport::Socket,
			},
			ChannelKind::Discussion => Capabilities {
				can_edit: true,
				can_delete: true,
				delete_transport: DeleteTransport::Request,
			},
		}
	}
}

impl fmt::Display for ChannelKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ChannelKind {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"classroom" | "chat" => Ok(ChannelKind::Classroom),
			"discussion" | "forum" => Ok(ChannelKind::Discussion),
			other => Err(ParseIdError::UnknownKind(other.to_string())),
		}
	}
}

/// How a delete command reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteTransport {
	/// `delete` frame over the live socket; acknowledged by the inbound `delete` frame.
	Socket,
	/// Separate request/response call; acknowledged by its success response.
	Request,
}

/// What a channel allows beyond sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
	pub can_edit: bool,
	pub can_delete: bool,
	pub delete_transport: DeleteTransport,
}

impl Default for Capabilities {
	fn default() -> Self {
		ChannelKind::Classroom.capabilities()
	}
}
