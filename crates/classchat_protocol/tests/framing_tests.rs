#![forbid(unsafe_code)]

use classchat_domain::RawId;
use classchat_protocol::{
	CodecError, DEFAULT_MAX_FRAME_SIZE, HistoryBody, InboundFrame, OutboundFrame, RawMessage, decode_frame,
	encode_frame,
};
use proptest::prelude::*;
use serde_json::Value;

#[test]
fn outbound_frames_carry_type_discriminator() {
	let cases = [
		(
			OutboundFrame::Send {
				message: "hi".to_string(),
				sender_id: "42".to_string(),
				client_message_id: Some("local-1".to_string()),
			},
			"send",
		),
		(
			OutboundFrame::ReadReceipt {
				message_id: "m1".to_string(),
			},
			"read_receipt",
		),
		(
			OutboundFrame::Edit {
				message_id: "m1".to_string(),
				message: "fixed".to_string(),
				sender_id: "42".to_string(),
			},
			"edit",
		),
		(
			OutboundFrame::Delete {
				message_id: "m1".to_string(),
			},
			"delete",
		),
	];

	for (frame, kind) in cases {
		let text = encode_frame(&frame, DEFAULT_MAX_FRAME_SIZE).expect("encode");
		let v: Value = serde_json::from_str(&text).expect("json");
		assert_eq!(v["type"], kind);
		assert_eq!(frame.kind(), kind);
	}
}

#[test]
fn send_frame_omits_missing_client_id() {
	let text = encode_frame(
		&OutboundFrame::Send {
			message: "hi".to_string(),
			sender_id: "42".to_string(),
			client_message_id: None,
		},
		DEFAULT_MAX_FRAME_SIZE,
	)
	.expect("encode");
	let v: Value = serde_json::from_str(&text).expect("json");
	assert!(v.get("client_message_id").is_none());
	assert_eq!(v["message"], "hi");
}

#[test]
fn edit_frame_decodes_with_new_content_and_timestamp() {
	let text = r#"{"type":"edit","message_id":"m1","message":"v2","timestamp":"2024-05-01T10:05:00Z"}"#;
	match decode_frame(text, DEFAULT_MAX_FRAME_SIZE).expect("decode") {
		InboundFrame::Edit(e) => {
			assert_eq!(e.message_id, RawId::Str("m1".to_string()));
			assert_eq!(e.content, "v2");
			assert!(e.read_by.is_none());
		}
		other => panic!("unexpected frame: {other:?}"),
	}
}

#[test]
fn delete_frame_decodes() {
	let frame = decode_frame(r#"{"type":"delete","message_id":5}"#, DEFAULT_MAX_FRAME_SIZE).expect("decode");
	assert_eq!(frame, InboundFrame::Delete(classchat_protocol::DeleteEvent { message_id: RawId::Int(5) }));
}

#[test]
fn decode_rejects_too_large_frame() {
	let text = format!(r#"{{"type":"delete","message_id":"{}"}}"#, "x".repeat(64));
	match decode_frame(&text, 16) {
		Err(CodecError::FrameTooLarge { .. }) => {}
		other => panic!("unexpected result: {other:?}"),
	}
}

#[test]
fn history_body_accepts_list_and_page() {
	let list: HistoryBody = serde_json::from_str(
		r#"[{"id":1,"content":"a","sender_id":2,"sender_name":"B","timestamp":"2024-05-01T10:00:00Z"}]"#,
	)
	.expect("list");
	let entries = list.into_entries();
	assert_eq!(entries.messages.len(), 1);
	assert!(entries.malformed.is_empty());
	assert_eq!(entries.next_page, None);

	let page: HistoryBody = serde_json::from_str(
		r#"{"data":[{"id":"m1","content":"a","sender_id":"U2","sender_name":"B","timestamp":"2024-05-01T10:00:00Z","read_by":["U1"]}],"next_page":2}"#,
	)
	.expect("page");
	let entries = page.into_entries();
	assert_eq!(entries.messages[0].read_by.as_deref(), Some(&[RawId::Str("U1".to_string())][..]));
	assert_eq!(entries.next_page, Some(2));
}

#[test]
fn history_page_keeps_good_entries_when_one_is_malformed() {
	let page: HistoryBody = serde_json::from_str(
		r#"{"data":[
			{"id":1,"content":null,"sender_id":2,"timestamp":"2024-05-01T10:00:00Z"},
			{"id":2,"content":"ok","sender_id":2,"timestamp":"2024-05-01T10:01:00Z"},
			{"content":"no id","timestamp":"2024-05-01T10:02:00Z"}
		],"next_page":3}"#,
	)
	.expect("page shape is still valid");

	let entries = page.into_entries();
	assert_eq!(entries.messages.len(), 1);
	assert_eq!(entries.messages[0].id, RawId::Int(2));
	assert_eq!(entries.malformed.iter().map(|m| m.index).collect::<Vec<_>>(), vec![0, 2]);
	assert_eq!(entries.total(), 3);
	assert_eq!(entries.next_page, Some(3));
}

#[test]
fn forum_history_body_decodes_nested_sender_and_updated_at() {
	let body: HistoryBody = serde_json::from_str(
		r#"{"isSuccess":true,"data":[
			{"id":"5","content":"hi","updatedAt":"2024-05-01T10:00:00Z","sender":{"id":7,"name":"Ada"}},
			{"id":"6","content":"yo","updatedAt":"2024-05-01T10:01:00Z","sender":{"id":8,"firstName":"Grace","lastName":"Hopper"},"is_read_by_current_user":true}
		]}"#,
	)
	.expect("forum body");

	let entries = body.into_entries();
	assert!(entries.malformed.is_empty(), "{:?}", entries.malformed);
	let [first, second] = &entries.messages[..] else {
		panic!("expected two messages, got {:?}", entries.messages);
	};
	assert_eq!(first.sender_id, Some(RawId::Int(7)));
	assert_eq!(first.sender_name.as_deref(), Some("Ada"));
	assert_eq!(first.timestamp, "2024-05-01T10:00:00Z");
	assert!(!first.read_by_current_user);
	assert_eq!(second.sender_name.as_deref(), Some("Grace Hopper"));
	assert!(second.read_by_current_user);
}

#[test]
fn flat_sender_fields_win_over_nested_profile() {
	let m: RawMessage = serde_json::from_str(
		r#"{"id":1,"content":"a","sender_id":"U2","sender_name":"Bea","sender":{"id":9,"name":"Other"},"timestamp":"2024-05-01T10:00:00Z"}"#,
	)
	.expect("message");
	assert_eq!(m.sender_id, Some(RawId::Str("U2".to_string())));
	assert_eq!(m.sender_name.as_deref(), Some("Bea"));
}

#[test]
fn message_without_timestamp_is_rejected() {
	let err = serde_json::from_str::<RawMessage>(r#"{"id":1,"content":"a"}"#).expect_err("no timestamp");
	assert!(err.to_string().contains("timestamp"), "{err}");
}

#[test]
fn edit_frame_accepts_camel_case_updated_at() {
	let text = r#"{"type":"edit","message_id":"m1","message":"v2","updatedAt":"2024-05-01T10:05:00Z"}"#;
	match decode_frame(text, DEFAULT_MAX_FRAME_SIZE).expect("decode") {
		InboundFrame::Edit(e) => assert_eq!(e.timestamp, "2024-05-01T10:05:00Z"),
		other => panic!("unexpected frame: {other:?}"),
	}
}

proptest! {
	#[test]
	fn arbitrary_text_never_panics_the_decoder(s in ".{0,256}") {
		let _ = decode_frame(&s, DEFAULT_MAX_FRAME_SIZE);
	}

	#[test]
	fn encoded_send_respects_limit(body in "[a-z ]{0,200}", max in 16usize..512) {
		let frame = OutboundFrame::Send { message: body, sender_id: "1".to_string(), client_message_id: None };
		match encode_frame(&frame, max) {
			Ok(text) => prop_assert!(text.len() <= max),
			Err(CodecError::FrameTooLarge { len, max: m }) => prop_assert!(len > m),
			Err(e) => prop_assert!(false, "unexpected error: {e}"),
		}
	}
}
