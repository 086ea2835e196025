use bytes::Bytes;

use super::negotiate::{MediaRange, parse_accept, range_matches};
use super::{Serializer, negotiate};
use crate::backend::Message;

#[test]
fn test_event_stream_emits_one_data_line_per_payload_line() {
    let message = Message::new("t", "a\nb");
    assert_eq!(
        Serializer::EventStream.serialize(&message),
        Bytes::from_static(b"data: a\ndata: b\n\n")
    );
}

#[test]
fn test_plain_appends_a_single_newline() {
    let message = Message::new("t", "a\nb");
    assert_eq!(
        Serializer::Plain.serialize(&message),
        Bytes::from_static(b"a\nb\n")
    );
}

#[test]
fn test_empty_and_trailing_newline_payloads() {
    assert_eq!(
        Serializer::EventStream.encode(b""),
        Bytes::from_static(b"data: \n\n")
    );
    assert_eq!(
        Serializer::EventStream.encode(b"x\n"),
        Bytes::from_static(b"data: x\ndata: \n\n")
    );
    assert_eq!(Serializer::Plain.encode(b""), Bytes::from_static(b"\n"));
}

#[test]
fn test_content_types() {
    assert_eq!(Serializer::EventStream.content_type(), "text/event-stream");
    assert_eq!(Serializer::Plain.content_type(), "text/plain");
}

#[test]
fn test_error_notice_stays_on_one_line() {
    assert_eq!(
        Serializer::EventStream.error_notice("connect failed: refused"),
        Bytes::from_static(b"event: error\ndata: connect failed: refused\n\n")
    );
    assert_eq!(
        Serializer::Plain.error_notice("bad\nthing"),
        Bytes::from_static(b"error: bad thing\n")
    );
}

#[test]
fn test_parse_accept_sorts_by_weight_keeping_ties_in_order() {
    let ranges = parse_accept("text/plain;q=0.5, text/html, application/json;q=oops, */*;q=0.9");
    let names: Vec<&str> = ranges.iter().map(|r| r.range.as_str()).collect();
    assert_eq!(
        names,
        vec!["text/html", "application/json", "*/*", "text/plain"]
    );
    assert_eq!(
        ranges[1],
        MediaRange {
            range: "application/json".to_string(),
            q: 1.0
        }
    );
}

#[test]
fn test_glob_matching() {
    assert!(range_matches("*/*", "text/plain"));
    assert!(range_matches("text/*", "text/event-stream"));
    assert!(!range_matches("application/*", "text/plain"));
    assert!(range_matches("text/plain", "text/plain"));
    assert!(!range_matches("text/plain", "text/event-stream"));
}

#[test]
fn test_higher_weight_event_stream_wins_over_plain() {
    assert_eq!(
        negotiate(Some("text/plain;q=0.5, text/event-stream;q=0.9")),
        Serializer::EventStream
    );
}

#[test]
fn test_plain_is_selected_when_preferred() {
    assert_eq!(negotiate(Some("text/plain")), Serializer::Plain);
    assert_eq!(
        negotiate(Some("text/event-stream;q=0.2, text/plain;q=0.8")),
        Serializer::Plain
    );
}

#[test]
fn test_defaults_when_absent_or_unmatched() {
    assert_eq!(negotiate(None), Serializer::EventStream);
    assert_eq!(negotiate(Some("application/json")), Serializer::EventStream);
    assert_eq!(negotiate(Some("")), Serializer::EventStream);
    assert_eq!(negotiate(Some("*/*")), Serializer::EventStream);
    assert_eq!(negotiate(Some("text/*")), Serializer::EventStream);
}

#[test]
fn test_zero_weight_ranges_are_not_acceptable() {
    assert_eq!(
        negotiate(Some("text/plain;q=0, application/json")),
        Serializer::EventStream
    );
}
