#![forbid(unsafe_code)]

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::ident::ids_equal;
use crate::{ChannelId, MessageId, ParseIdError, UserId};

/// Instant a message was created or last updated by its origin.
pub type Timestamp = DateTime<Utc>;

/// Parse an origin timestamp (RFC 3339, or naive ISO 8601 treated as UTC).
pub fn parse_timestamp(s: &str) -> Result<Timestamp, ParseIdError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(ParseIdError::Empty);
	}

	if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
		return Ok(ts.with_timezone(&Utc));
	}

	for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
		if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
			return Ok(naive.and_utc());
		}
	}

	Err(ParseIdError::InvalidTimestamp(s.to_string()))
}

/// Whether a message was authored by the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginClass {
	Own,
	Other,
}

/// Server-side delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryState {
	/// Sent optimistically, awaiting the server echo.
	Pending,
	#[default]
	Confirmed,
	Failed,
}

/// One entry of a channel timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	pub id: MessageId,
	pub channel_id: ChannelId,
	pub content: String,
	pub sender_id: UserId,
	pub sender_display_name: String,
	pub timestamp: Timestamp,
	/// Reader ids in first-seen order, no duplicates.
	pub read_by: Vec<UserId>,
	pub delivery_state: DeliveryState,
	/// Client-generated correlation id for optimistic sends.
	pub client_message_id: Option<String>,
}

impl Message {
	pub fn origin_class(&self, current_user: &UserId) -> OriginClass {
		if ids_equal(self.sender_id.as_str(), current_user.as_str()) {
			OriginClass::Own
		} else {
			OriginClass::Other
		}
	}

	pub fn is_own(&self, current_user: &UserId) -> bool {
		self.origin_class(current_user) == OriginClass::Own
	}

	pub fn is_read_by(&self, reader: &UserId) -> bool {
		self.read_by.iter().any(|r| r == reader)
	}

	/// Record a reader. Returns false when the reader was already present.
	pub fn add_reader(&mut self, reader: UserId) -> bool {
		if self.is_read_by(&reader) {
			return false;
		}
		self.read_by.push(reader);
		true
	}

	/// Timeline ordering key: timestamp, then id.
	pub fn sort_key(&self) -> (Timestamp, &str) {
		(self.timestamp, self.id.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn msg(sender: &str) -> Message {
		Message {
			id: MessageId::new("m1").unwrap(),
			channel_id: ChannelId::new("C1").unwrap(),
			content: "hi".to_string(),
			sender_id: UserId::new(sender).unwrap(),
			sender_display_name: "someone".to_string(),
			timestamp: parse_timestamp("2024-05-01T10:00:00Z").unwrap(),
			read_by: Vec::new(),
			delivery_state: DeliveryState::Confirmed,
			client_message_id: None,
		}
	}

	#[test]
	fn numeric_sender_is_classified_as_own() {
		let me = UserId::new("42").unwrap();
		let m = msg(" 42");
		assert_eq!(m.origin_class(&me), OriginClass::Own);
		assert_eq!(msg("43").origin_class(&me), OriginClass::Other);
	}

	#[test]
	fn add_reader_is_idempotent() {
		let mut m = msg("U2");
		let reader = UserId::new("U1").unwrap();
		assert!(m.add_reader(reader.clone()));
		assert!(!m.add_reader(reader.clone()));
		assert_eq!(m.read_by, vec![reader]);
	}

	#[test]
	fn parses_rfc3339_and_naive_timestamps() {
		let a = parse_timestamp("2024-05-01T10:00:00Z").unwrap();
		let b = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
		let c = parse_timestamp("2024-05-01T10:00:00.000000").unwrap();
		assert_eq!(a, b);
		assert_eq!(a, c);
		assert!(parse_timestamp("yesterday").is_err());
		assert!(parse_timestamp("  ").is_err());
	}
}
