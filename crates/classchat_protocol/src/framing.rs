#![forbid(unsafe_code)]

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::frames::{InboundFrame, OutboundFrame};

/// Default maximum text frame size.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024; // 256 KiB

#[derive(Debug, Error)]
pub enum CodecError {
	#[error("frame exceeds maximum size: len={len} max={max}")]
	FrameTooLarge {
		len: usize,
		max: usize,
	},

	#[error("frame has no type discriminator")]
	MissingType,

	#[error("unknown frame type: {0}")]
	UnknownType(String),

	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Envelope {
	#[serde(rename = "type")]
	kind: Option<String>,
	#[serde(flatten)]
	body: serde_json::Map<String, Value>,
}

/// Encode an outbound frame as JSON text.
pub fn encode_frame(frame: &OutboundFrame, max_frame_size: usize) -> Result<String, CodecError> {
	let text = serde_json::to_string(frame)?;
	if text.len() > max_frame_size {
		return Err(CodecError::FrameTooLarge {
			len: text.len(),
			max: max_frame_size,
		});
	}
	Ok(text)
}

/// Decode one inbound JSON text frame.
pub fn decode_frame(text: &str, max_frame_size: usize) -> Result<InboundFrame, CodecError> {
	if text.len() > max_frame_size {
		return Err(CodecError::FrameTooLarge {
			len: text.len(),
			max: max_frame_size,
		});
	}

	let env: Envelope = serde_json::from_str(text)?;
	let kind = env.kind.ok_or(CodecError::MissingType)?;
	let body = Value::Object(env.body);

	let frame = match kind.as_str() {
		"message" => InboundFrame::Message(serde_json::from_value(body)?),
		"read_receipt" => InboundFrame::ReadReceipt(serde_json::from_value(body)?),
		"edit" => InboundFrame::Edit(serde_json::from_value(body)?),
		"delete" => InboundFrame::Delete(serde_json::from_value(body)?),
		_ => return Err(CodecError::UnknownType(kind)),
	};
	Ok(frame)
}
