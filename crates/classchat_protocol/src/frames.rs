#![forbid(unsafe_code)]

use classchat_domain::RawId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message as delivered by the history endpoint or a live `message` frame.
///
/// The live socket historically used `message_id`/`message`/`sender` where the
/// history endpoint uses `id`/`content`/`sender_name`; the forum endpoint sends
/// `updatedAt` and a nested `sender` object. All of them decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct RawMessage {
	pub id: RawId,

	pub content: String,

	pub sender_id: Option<RawId>,

	pub sender_name: Option<String>,

	pub timestamp: String,

	/// Explicit reader set; absent means "unchanged".
	#[serde(skip_serializing_if = "Option::is_none")]
	pub read_by: Option<Vec<RawId>>,

	/// Echo of the client correlation id on a confirmed send.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub client_message_id: Option<String>,

	/// Server-side flag: the requesting user already read this message.
	#[serde(rename = "is_read_by_current_user", skip_serializing_if = "is_false")]
	pub read_by_current_user: bool,
}

fn is_false(v: &bool) -> bool {
	!*v
}

#[derive(Deserialize)]
struct WireMessage {
	#[serde(alias = "message_id")]
	id: RawId,
	#[serde(default, alias = "message")]
	content: Option<String>,
	#[serde(default)]
	sender_id: Option<RawId>,
	#[serde(default)]
	sender_name: Option<String>,
	#[serde(default)]
	sender: Option<WireSender>,
	#[serde(default)]
	timestamp: Option<String>,
	#[serde(default, alias = "updatedAt")]
	updated_at: Option<String>,
	#[serde(default)]
	read_by: Option<Vec<RawId>>,
	#[serde(default)]
	client_message_id: Option<String>,
	#[serde(default)]
	is_read_by_current_user: Option<bool>,
}

/// `sender` is a display name on the socket and a profile object on the forum endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireSender {
	Name(String),
	Profile(WireProfile),
}

#[derive(Deserialize)]
struct WireProfile {
	#[serde(default)]
	id: Option<RawId>,
	#[serde(default)]
	name: Option<String>,
	#[serde(default, alias = "firstName")]
	first_name: Option<String>,
	#[serde(default, alias = "lastName")]
	last_name: Option<String>,
}

impl WireProfile {
	fn display_name(&self) -> Option<String> {
		if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
			return Some(name.to_string());
		}
		let full = [self.first_name.as_deref(), self.last_name.as_deref()]
			.into_iter()
			.flatten()
			.map(str::trim)
			.filter(|p| !p.is_empty())
			.collect::<Vec<_>>()
			.join(" ");
		(!full.is_empty()).then_some(full)
	}
}

impl TryFrom<WireMessage> for RawMessage {
	type Error = String;

	fn try_from(w: WireMessage) -> Result<Self, Self::Error> {
		let content = w.content.ok_or_else(|| "message has no content".to_string())?;
		let timestamp = w
			.timestamp
			.or(w.updated_at)
			.ok_or_else(|| "message has no timestamp".to_string())?;

		let (profile_id, profile_name) = match w.sender {
			Some(WireSender::Name(name)) => (None, Some(name)),
			Some(WireSender::Profile(p)) => {
				let name = p.display_name();
				(p.id, name)
			}
			None => (None, None),
		};

		Ok(Self {
			id: w.id,
			content,
			sender_id: w.sender_id.or(profile_id),
			sender_name: w.sender_name.or(profile_name),
			timestamp,
			read_by: w.read_by,
			client_message_id: w.client_message_id,
			read_by_current_user: w.is_read_by_current_user.unwrap_or(false),
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceiptEvent {
	pub message_id: RawId,
	pub reader_id: RawId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditEvent {
	#[serde(alias = "id")]
	pub message_id: RawId,

	#[serde(alias = "message")]
	pub content: String,

	#[serde(alias = "updated_at", alias = "updatedAt")]
	pub timestamp: String,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub read_by: Option<Vec<RawId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteEvent {
	#[serde(alias = "id")]
	pub message_id: RawId,
}

/// Server → client frame, discriminated by `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
	Message(RawMessage),
	ReadReceipt(ReadReceiptEvent),
	Edit(EditEvent),
	Delete(DeleteEvent),
}

impl InboundFrame {
	pub const fn kind(&self) -> &'static str {
		match self {
			InboundFrame::Message(_) => "message",
			InboundFrame::ReadReceipt(_) => "read_receipt",
			InboundFrame::Edit(_) => "edit",
			InboundFrame::Delete(_) => "delete",
		}
	}
}

/// Client → server frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
	Send {
		message: String,
		sender_id: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		client_message_id: Option<String>,
	},
	ReadReceipt {
		message_id: String,
	},
	Edit {
		message_id: String,
		message: String,
		sender_id: String,
	},
	Delete {
		message_id: String,
	},
}

impl OutboundFrame {
	pub const fn kind(&self) -> &'static str {
		match self {
			OutboundFrame::Send { .. } => "send",
			OutboundFrame::ReadReceipt { .. } => "read_receipt",
			OutboundFrame::Edit { .. } => "edit",
			OutboundFrame::Delete { .. } => "delete",
		}
	}
}

/// History endpoint body: a bare array, or a page object.
///
/// Entries stay undecoded here so one bad entry cannot take the page down.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HistoryBody {
	List(Vec<Value>),
	Page {
		data: Vec<Value>,
		#[serde(default, alias = "nextPage")]
		next_page: Option<u32>,
	},
}

/// History entry that did not decode as a message.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedEntry {
	pub index: usize,
	pub error: String,
}

/// Decoded contents of a `HistoryBody`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryEntries {
	pub messages: Vec<RawMessage>,
	pub malformed: Vec<MalformedEntry>,
	pub next_page: Option<u32>,
}

impl HistoryEntries {
	/// Number of entries the server sent, decodable or not.
	pub fn total(&self) -> usize {
		self.messages.len() + self.malformed.len()
	}
}

impl HistoryBody {
	/// Decode each entry on its own and keep the next page marker, if any.
	pub fn into_entries(self) -> HistoryEntries {
		let (items, next_page) = match self {
			HistoryBody::List(items) => (items, None),
			HistoryBody::Page { data, next_page } => (data, next_page),
		};

		let mut out = HistoryEntries {
			next_page,
			..HistoryEntries::default()
		};
		for (index, item) in items.into_iter().enumerate() {
			match serde_json::from_value::<RawMessage>(item) {
				Ok(m) => out.messages.push(m),
				Err(e) => out.malformed.push(MalformedEntry {
					index,
					error: e.to_string(),
				}),
			}
		}
		out
	}
}
