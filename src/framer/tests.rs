//! Tests for delimiter framing across chunk boundaries.

use rstest::{fixture, rstest};

use crate::buffer::ReceiveBuffer;
use crate::record::{DecodeError, DecodeRecord, Record};

use super::{RECORD_SEPARATOR, RecordFramer};

/// Plain-text payload so scenarios read like the wire format.
#[derive(Debug, PartialEq)]
struct Text(String);

impl DecodeRecord for Text {
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.starts_with(b"!") {
            let source = serde_json::from_slice::<serde_json::Value>(bytes)
                .expect_err("'!' is never valid JSON");
            return Err(DecodeError::Json {
                len: bytes.len(),
                source,
            });
        }
        Ok(Text(String::from_utf8_lossy(bytes).into_owned()))
    }
}

fn texts(items: &[&str]) -> Vec<Text> {
    items.iter().map(|s| Text((*s).to_owned())).collect()
}

#[fixture]
fn buffer() -> ReceiveBuffer {
    ReceiveBuffer::with_capacity(64)
}

fn feed(
    framer: &mut RecordFramer,
    buffer: &mut ReceiveBuffer,
    chunk: &[u8],
    end_of_message: bool,
) -> Result<Vec<Text>, DecodeError> {
    buffer.extend_from_slice(chunk).expect("chunk fits");
    let mut out = Vec::new();
    framer.drain(buffer, end_of_message, |t: Text| out.push(t))?;
    Ok(out)
}

#[rstest]
fn splits_single_message_with_trailing_record(mut buffer: ReceiveBuffer) {
    let mut framer = RecordFramer::new();
    let out = feed(&mut framer, &mut buffer, b"a\x1eb\x1ec", true).expect("frames");
    assert_eq!(out, texts(&["a", "b", "c"]));
    assert!(buffer.is_empty());
}

#[rstest]
fn leading_delimiter_in_next_message_is_skipped(mut buffer: ReceiveBuffer) {
    let mut framer = RecordFramer::new();
    let first = feed(&mut framer, &mut buffer, b"a\x1eb", true).expect("frames");
    assert_eq!(first, texts(&["a", "b"]));
    let second = feed(&mut framer, &mut buffer, b"\x1ec", true).expect("frames");
    assert_eq!(second, texts(&["c"]));
}

#[rstest]
fn partial_record_is_retained_until_completed(mut buffer: ReceiveBuffer) {
    let mut framer = RecordFramer::new();
    let first = feed(&mut framer, &mut buffer, b"alpha\x1ebe", false).expect("frames");
    assert_eq!(first, texts(&["alpha"]));
    assert_eq!(buffer.filled(), b"be");

    let second = feed(&mut framer, &mut buffer, b"ta\x1egam", false).expect("frames");
    assert_eq!(second, texts(&["beta"]));
    assert_eq!(buffer.filled(), b"gam");

    let third = feed(&mut framer, &mut buffer, b"ma", true).expect("frames");
    assert_eq!(third, texts(&["gamma"]));
    assert!(buffer.is_empty());
}

#[rstest]
fn incomplete_tail_without_end_of_message_is_not_emitted(mut buffer: ReceiveBuffer) {
    let mut framer = RecordFramer::new();
    let out = feed(&mut framer, &mut buffer, b"pending", false).expect("frames");
    assert!(out.is_empty());
    assert_eq!(buffer.filled(), b"pending");
}

#[rstest]
#[case(b"\x1e\x1e".as_slice(), &[])]
#[case(b"a\x1e\x1eb".as_slice(), &["a", "b"])]
#[case(b"a\x1e  \r\n".as_slice(), &["a"])]
#[case(b"".as_slice(), &[])]
fn blank_spans_produce_no_records(#[case] chunk: &[u8], #[case] expected: &[&str]) {
    let mut buffer = ReceiveBuffer::with_capacity(64);
    let mut framer = RecordFramer::new();
    let out = feed(&mut framer, &mut buffer, chunk, true).expect("frames");
    assert_eq!(out, texts(expected));
}

#[rstest]
fn decode_error_resets_buffer_after_emitting_prefix(mut buffer: ReceiveBuffer) {
    let mut framer = RecordFramer::new();
    buffer.extend_from_slice(b"ok\x1e!bad\x1elater").expect("fits");
    let mut out = Vec::new();
    let err = framer
        .drain(&mut buffer, true, |t: Text| out.push(t))
        .expect_err("malformed span must surface");
    assert!(matches!(err, DecodeError::Json { len: 4, .. }));
    assert_eq!(out, texts(&["ok"]));
    assert!(buffer.is_empty());

    let next = feed(&mut framer, &mut buffer, b"fresh", true).expect("frames");
    assert_eq!(next, texts(&["fresh"]));
}

#[rstest]
fn decodes_json_records() {
    let mut buffer = ReceiveBuffer::with_capacity(256);
    let mut framer = RecordFramer::new();
    let mut payload = br#"{"level":"Info","message":"one"}"#.to_vec();
    payload.push(RECORD_SEPARATOR);
    payload.extend_from_slice(br#"{"level":"Warn","message":"two"}"#);
    payload.push(RECORD_SEPARATOR);
    buffer.extend_from_slice(&payload).expect("fits");

    let mut records = Vec::new();
    let count = framer
        .drain(&mut buffer, true, |r: Record| records.push(r))
        .expect("frames");
    assert_eq!(count, 2);
    let texts: Vec<_> = records.iter().map(Record::text).collect();
    assert_eq!(texts, ["one", "two"]);
}

#[rstest]
fn reset_forgets_scan_progress(mut buffer: ReceiveBuffer) {
    let mut framer = RecordFramer::new();
    feed(&mut framer, &mut buffer, b"abc", false).expect("frames");
    buffer.clear();
    framer.reset();
    let out = feed(&mut framer, &mut buffer, b"x\x1ey", false).expect("frames");
    assert_eq!(out, texts(&["x"]));
}
