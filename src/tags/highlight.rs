//! Highlight rendering for block text
//!
//! Exact offset ranges are preferred. Blocks without offset data fall back to
//! case-insensitive phrase matching, longest phrase first so shorter phrases
//! never split a longer match.

use super::offsets::char_slice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Plain,
    Highlighted,
    /// Highlight belonging to the tag under the pointer
    Hovered,
}

/// A run of block text with a single highlight style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpan {
    pub text: String,
    pub kind: SpanKind,
    /// Character offsets of the run within the block
    pub start: usize,
    pub end: usize,
}

/// Clamp to `len`, drop empty ranges, sort and merge overlapping or adjacent ranges.
pub fn merge_ranges(
    ranges: impl IntoIterator<Item = (usize, usize)>,
    len: usize,
) -> Vec<(usize, usize)> {
    let mut sorted: Vec<(usize, usize)> = ranges
        .into_iter()
        .map(|(a, b)| (a.min(b).min(len), a.max(b).min(len)))
        .filter(|(a, b)| a < b)
        .collect();
    sorted.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(sorted.len());
    for (start, end) in sorted {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn chars_match(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Non-overlapping case-insensitive occurrences of `phrases` in `text`
pub fn phrase_ranges<S: AsRef<str>>(text: &str, phrases: &[S]) -> Vec<(usize, usize)> {
    let haystack: Vec<char> = text.chars().collect();
    let mut needles: Vec<Vec<char>> = phrases
        .iter()
        .map(|p| p.as_ref().trim().chars().collect::<Vec<char>>())
        .filter(|p| !p.is_empty())
        .collect();
    needles.sort_by(|a, b| b.len().cmp(&a.len()));
    needles.dedup();

    let mut claimed: Vec<(usize, usize)> = Vec::new();
    for needle in &needles {
        if needle.len() > haystack.len() {
            continue;
        }
        let mut i = 0;
        while i + needle.len() <= haystack.len() {
            let end = i + needle.len();
            let is_match = haystack[i..end]
                .iter()
                .zip(needle)
                .all(|(a, b)| chars_match(*a, *b));
            let free = claimed.iter().all(|&(s, e)| end <= s || i >= e);
            if is_match && free {
                claimed.push((i, end));
                i = end;
            } else {
                i += 1;
            }
        }
    }
    claimed.sort_unstable();
    claimed
}

fn inside(ranges: &[(usize, usize)], start: usize, end: usize) -> bool {
    ranges.iter().any(|&(s, e)| s <= start && end <= e)
}

/// Split `text` into styled runs. Concatenating the runs yields `text`.
pub fn render(
    text: &str,
    highlights: &[(usize, usize)],
    hovered: &[(usize, usize)],
) -> Vec<HighlightSpan> {
    let len = text.chars().count();
    let highlights = merge_ranges(highlights.iter().copied(), len);
    let hovered = merge_ranges(hovered.iter().copied(), len);

    let mut cuts: Vec<usize> = vec![0, len];
    for &(s, e) in highlights.iter().chain(hovered.iter()) {
        cuts.push(s);
        cuts.push(e);
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut spans: Vec<HighlightSpan> = Vec::new();
    for pair in cuts.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if start == end {
            continue;
        }
        let kind = if inside(&hovered, start, end) {
            SpanKind::Hovered
        } else if inside(&highlights, start, end) {
            SpanKind::Highlighted
        } else {
            SpanKind::Plain
        };
        match spans.last_mut() {
            Some(last) if last.kind == kind => {
                last.text.push_str(char_slice(text, start, end));
                last.end = end;
            }
            _ => spans.push(HighlightSpan {
                text: char_slice(text, start, end).to_string(),
                kind,
                start,
                end,
            }),
        }
    }
    spans
}

/// Text of every highlighted run, hovered parts included
pub fn highlighted_text(spans: &[HighlightSpan]) -> Vec<String> {
    let mut runs: Vec<String> = Vec::new();
    let mut in_run = false;
    for span in spans {
        if span.kind == SpanKind::Plain {
            in_run = false;
            continue;
        }
        match runs.last_mut() {
            Some(run) if in_run => run.push_str(&span.text),
            _ => runs.push(span.text.clone()),
        }
        in_run = true;
    }
    runs
}
