#![forbid(unsafe_code)]

pub mod frames;
pub mod framing;

pub use frames::{
	DeleteEvent, EditEvent, HistoryBody, HistoryEntries, InboundFrame, MalformedEntry, OutboundFrame, RawMessage,
	ReadReceiptEvent,
};
pub use framing::{CodecError, DEFAULT_MAX_FRAME_SIZE, decode_frame, encode_frame};
