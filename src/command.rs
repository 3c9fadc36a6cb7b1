//! Control markers embedded in narrated text.
//!
//! The narrating agent is instructed to append `[NEXT]`, `[REPLAY]` or
//! `[SHOW:<id>]` to a line when the clip should change. Markers are matched
//! case-insensitively against a whole, reassembled utterance. Matching
//! fragments would miss a marker split across two deltas.

pub const NEXT_MARKER: &str = "[NEXT]";
pub const REPLAY_MARKER: &str = "[REPLAY]";
pub const SHOW_MARKER_PREFIX: &str = "[SHOW:";

const NEXT_KEYWORD: &str = "next";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Next,
    Replay,
    ShowById(String),
}

/// Extracts at most one directive from a completed utterance.
///
/// `[NEXT]` wins over `[REPLAY]`, which wins over `[SHOW:<id>]`. A show
/// marker whose payload is `next` is an alias for `[NEXT]`.
pub fn parse(text: &str) -> Option<Directive> {
    if text.trim().is_empty() {
        return None;
    }
    // ASCII lowering keeps byte offsets aligned with `text`.
    let lowered = text.to_ascii_lowercase();

    if lowered.contains(&NEXT_MARKER.to_ascii_lowercase()) {
        return Some(Directive::Next);
    }
    if lowered.contains(&REPLAY_MARKER.to_ascii_lowercase()) {
        return Some(Directive::Replay);
    }

    let (start, end) = find_show(&lowered, 0)?;
    let id = text[start..end].trim();
    if id.eq_ignore_ascii_case(NEXT_KEYWORD) {
        Some(Directive::Next)
    } else {
        Some(Directive::ShowById(id.to_string()))
    }
}

/// Removes every marker so the remaining words can be logged as spoken.
pub fn strip_markers(text: &str) -> String {
    let lowered = text.to_ascii_lowercase();
    let mut spans: Vec<(usize, usize)> = Vec::new();

    for marker in [NEXT_MARKER, REPLAY_MARKER] {
        let marker = marker.to_ascii_lowercase();
        spans.extend(
            lowered
                .match_indices(&marker)
                .map(|(at, m)| (at, at + m.len())),
        );
    }
    let mut from = 0;
    while let Some((start, end)) = find_show(&lowered, from) {
        // `end` points at the payload's closing bracket.
        spans.push((start - SHOW_MARKER_PREFIX.len(), end + 1));
        from = end + 1;
    }
    spans.sort_unstable();

    let mut kept = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in spans {
        if start < cursor {
            continue;
        }
        kept.push_str(&text[cursor..start]);
        kept.push(' ');
        cursor = end;
    }
    kept.push_str(&text[cursor..]);

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Finds the first `[show:<payload>]` at or after `from` in lowered text and
/// returns the payload's byte range. Empty or blank payloads do not count.
fn find_show(lowered: &str, from: usize) -> Option<(usize, usize)> {
    let prefix = SHOW_MARKER_PREFIX.to_ascii_lowercase();
    let mut search = from;
    while let Some(offset) = lowered[search..].find(&prefix) {
        let start = search + offset + prefix.len();
        let close = lowered[start..].find(']')?;
        let end = start + close;
        if !lowered[start..end].trim().is_empty() && !lowered[start..end].contains('[') {
            return Some((start, end));
        }
        search = start;
    }
    None
}
