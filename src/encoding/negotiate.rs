//! `Accept` header negotiation.
//!
//! Media ranges are ranked by their `q` weight (missing or unparsable weights
//! count as 1.0, ties keep header order) and the first range matching one of
//! the available serializers wins. Without a header, or without a match, the
//! event-stream encoding is used.

use super::Serializer;

pub const DEFAULT: Serializer = Serializer::EventStream;

/// One parsed entry of an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub range: String,
    pub q: f32,
}

pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> = header
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';').map(str::trim);
            let range = parts.next().filter(|r| !r.is_empty())?.to_ascii_lowercase();
            let q = parts
                .filter_map(|param| param.split_once('='))
                .find(|(key, _)| key.trim().eq_ignore_ascii_case("q"))
                .and_then(|(_, value)| value.trim().parse::<f32>().ok())
                .filter(|q| q.is_finite())
                .unwrap_or(1.0);
            Some(MediaRange { range, q })
        })
        .collect();
    // `sort_by` is stable.
    ranges.sort_by(|a, b| b.q.total_cmp(&a.q));
    ranges
}

/// Glob match of a content type against `*/*`, `type/*` or an exact range.
pub fn range_matches(range: &str, content_type: &str) -> bool {
    if range == "*/*" || range == "*" {
        return true;
    }
    match range.strip_suffix("/*") {
        Some(kind) => content_type
            .split_once('/')
            .is_some_and(|(ct_kind, _)| ct_kind == kind),
        None => range == content_type,
    }
}

pub fn negotiate(accept: Option<&str>) -> Serializer {
    let Some(header) = accept else {
        return DEFAULT;
    };
    for candidate in parse_accept(header) {
        if candidate.q <= 0.0 {
            continue;
        }
        if let Some(serializer) = Serializer::ALL
            .iter()
            .find(|s| range_matches(&candidate.range, s.content_type()))
        {
            return *serializer;
        }
    }
    DEFAULT
}
