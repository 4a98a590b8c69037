//! Unit tests for the gateway codec.

use bytes::{BufMut, Bytes};
use proptest::prelude::*;
use rstest::rstest;
use serde_json::json;

use super::*;
use crate::frame::{FrameKind, encode_request};

fn raw_frame(kind: u16, call_id: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.put_u16(kind);
    out.put_u32(u32::try_from(body.len()).expect("test body fits in u32"));
    out.put_u32(call_id);
    out.put_slice(&[0u8; 6]);
    out.put_slice(body);
    out
}

/// Feed `chunks` one by one, draining every complete frame after each push.
fn decode_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Vec<Result<Frame, String>> {
    let mut codec = GatewayCodec::new();
    let mut buf = BytesMut::new();
    let mut out = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        while let Some(decoded) = codec.decode(&mut buf).expect("framing stays valid") {
            out.push(decoded.map_err(|e| e.to_string()));
        }
    }
    assert!(buf.is_empty(), "no bytes should remain after a complete stream");
    out
}

fn sample_stream() -> Vec<u8> {
    let mut stream = Vec::new();
    stream.extend(raw_frame(0x10, 1, br#"{"name":"test"}"#));
    stream.extend(raw_frame(0x11, 2, br#"{"message":"boom","code":500}"#));
    stream.extend(raw_frame(0x10, 3, b"[1,2,3]"));
    stream.extend(encode_request(4, "triton.echo", Some(&json!({"k": "v"}))).expect("encode"));
    stream
}

#[rstest]
#[case::reply(0x10, FrameKind::Reply)]
#[case::error(0x11, FrameKind::Error)]
#[case::request(0x01, FrameKind::Request)]
#[case::unknown(0x42, FrameKind::Unknown(0x42))]
fn decodes_frame_types(#[case] raw: u16, #[case] kind: FrameKind) {
    let mut codec = GatewayCodec::new();
    let mut buf = BytesMut::from(&raw_frame(raw, 77, br#"{"ok":true}"#)[..]);

    let frame = codec
        .decode(&mut buf)
        .expect("decode should succeed")
        .expect("should produce a frame")
        .expect("body is valid json");

    assert_eq!(frame.kind, kind);
    assert_eq!(frame.call_id, 77);
    assert_eq!(frame.body, json!({"ok": true}));
    assert!(buf.is_empty());
}

#[rstest]
fn returns_none_for_partial_header() {
    let mut codec = GatewayCodec::new();
    let mut buf = BytesMut::from(&[0u8; 10][..]);

    let result = codec.decode(&mut buf).expect("decode should succeed");

    assert!(result.is_none());
    assert_eq!(buf.len(), 10);
}

#[rstest]
fn returns_none_for_partial_body_without_consuming() {
    let bytes = raw_frame(0x10, 5, br#"{"partial":"body"}"#);
    let mut codec = GatewayCodec::new();
    let mut buf = BytesMut::from(&bytes[..bytes.len() - 3]);

    let result = codec.decode(&mut buf).expect("decode should succeed");

    assert!(result.is_none());
    assert_eq!(buf.len(), bytes.len() - 3);
}

#[rstest]
fn decodes_coalesced_frames_one_at_a_time() {
    let mut codec = GatewayCodec::new();
    let mut buf = BytesMut::from(&sample_stream()[..]);

    let mut ids = Vec::new();
    while let Some(decoded) = codec.decode(&mut buf).expect("decode should succeed") {
        ids.push(decoded.expect("valid body").call_id);
    }

    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[rstest]
#[case::not_json(b"not json".as_slice())]
#[case::empty_body(b"".as_slice())]
#[case::bad_utf8(b"\"\xff\xfe\"".as_slice())]
fn skips_malformed_body_and_continues(#[case] body: &[u8]) {
    let mut stream = raw_frame(0x10, 9, body);
    stream.extend(raw_frame(0x10, 10, b"true"));
    let decoded = decode_chunks([stream.as_slice()]);

    assert_eq!(decoded.len(), 2);
    let first = decoded.first().expect("first result");
    let err = first.as_ref().expect_err("first frame is malformed");
    assert!(err.contains("call 9"), "unexpected error: {err}");
    assert_eq!(
        decoded.get(1).cloned().expect("second result"),
        Ok(Frame::reply(10, json!(true)))
    );
}

#[rstest]
fn rejects_body_above_limit() {
    let mut codec = GatewayCodec::new().with_max_body_len(8);
    let mut buf = BytesMut::from(&raw_frame(0x10, 1, b"\"0123456789\"")[..]);

    let err = codec.decode(&mut buf).expect_err("oversized body must fail");

    assert!(matches!(err, FrameError::BodyTooLarge { len: 12, max: 8 }));
}

#[rstest]
fn rejects_oversized_header_before_body_arrives() {
    let mut codec = GatewayCodec::new();
    let mut header = Vec::new();
    header.put_u16(0x10);
    header.put_u32(u32::MAX);
    header.put_u32(1);
    header.put_slice(&[0u8; 6]);
    let mut buf = BytesMut::from(&header[..]);

    assert!(codec.decode(&mut buf).is_err());
}

#[rstest]
fn encoder_output_decodes_to_same_frame() {
    let mut codec = GatewayCodec::new();
    let frame = Frame::error(12, "no such keyspace", Some(611));
    let mut buf = BytesMut::new();

    codec.encode(frame.clone(), &mut buf).expect("encode");
    let decoded = codec
        .decode(&mut buf)
        .expect("decode")
        .expect("complete")
        .expect("valid");

    assert_eq!(decoded, frame);
}

#[rstest]
#[case::no_payload(1, "triton.heartbeat", None)]
#[case::object(42, "triton.echo", Some(json!({"name": "test"})))]
#[case::nested(9_999_999, "cassandra.column.get", Some(json!({"keys": [1, 2], "cf": null})))]
fn request_round_trip_preserves_fields(
    #[case] call_id: u32,
    #[case] name: &str,
    #[case] payload: Option<Value>,
) {
    let bytes = encode_request(call_id, name, payload.as_ref()).expect("encode");
    let decoded = decode_chunks([&bytes[..]]);

    let frame = decoded
        .into_iter()
        .next()
        .expect("one frame")
        .expect("valid body");
    let request = frame.request_body().expect("request envelope");
    assert_eq!(frame.call_id, call_id);
    assert_eq!(request.name, name);
    assert_eq!(request.body, payload.unwrap_or(Value::Null));
}

#[rstest]
fn one_byte_at_a_time_matches_whole_stream() {
    let stream = sample_stream();
    let whole = decode_chunks([stream.as_slice()]);
    let trickled = decode_chunks(stream.chunks(1));

    assert_eq!(whole.len(), 4);
    assert_eq!(trickled, whole);
}

#[rstest]
fn decode_eof_discards_trailing_partial_frame() {
    let mut codec = GatewayCodec::new();
    let bytes = raw_frame(0x10, 1, b"null");
    let mut buf = BytesMut::from(&bytes[..bytes.len() - 1]);

    let result = codec.decode_eof(&mut buf).expect("eof handling is not an error");

    assert!(result.is_none());
    assert!(buf.is_empty());
}

fn arb_frame() -> impl Strategy<Value = (u16, u32, String)> {
    (
        prop_oneof![Just(0x01u16), Just(0x10u16), Just(0x11u16)],
        any::<u32>(),
        "[a-z0-9 ]{0,40}",
    )
}

proptest! {
    #[test]
    fn reassembly_is_independent_of_fragmentation(
        frames in prop::collection::vec(arb_frame(), 1..8),
        cuts in prop::collection::vec(1usize..64, 1..32),
    ) {
        let mut stream = Vec::new();
        for (kind, call_id, text) in &frames {
            let body = serde_json::to_vec(&json!({ "text": text })).expect("serialise");
            stream.extend(raw_frame(*kind, *call_id, &body));
        }
        let stream = Bytes::from(stream);

        let mut chunks = Vec::new();
        let mut rest = stream.clone();
        for cut in cuts.iter().cycle() {
            if rest.is_empty() {
                break;
            }
            let at = (*cut).min(rest.len());
            chunks.push(rest.split_to(at));
        }

        let whole = decode_chunks([&stream[..]]);
        let pieces = decode_chunks(chunks.iter().map(|chunk| &chunk[..]));
        prop_assert_eq!(pieces.len(), frames.len());
        prop_assert_eq!(pieces, whole);
    }
}
