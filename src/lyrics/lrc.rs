use lazy_static::lazy_static;
use regex::Regex;

use crate::model::SyncedLyricLine;

/// Subtracted from every timestamp so a line lights up slightly before it is
/// sung.
pub const DEFAULT_OFFSET: f64 = 0.2;

lazy_static! {
    static ref TIMED_LINE: Regex =
        Regex::new(r"^\[(\d+):(\d+(?:\.\d+)?)\](.*)$").expect("valid LRC line pattern");
}

/// Parses an LRC payload with the default offset.
#[cfg(test)]
pub fn parse(payload: &str) -> Vec<SyncedLyricLine> {
    parse_with_offset(payload, DEFAULT_OFFSET)
}

/// Parses `[mm:ss.cc]text` lines. Anything else (tags, blank text, garbage)
/// is dropped. The result is sorted by timestamp, ties keep payload order.
pub fn parse_with_offset(payload: &str, offset: f64) -> Vec<SyncedLyricLine> {
    let mut lines: Vec<SyncedLyricLine> = payload
        .lines()
        .filter_map(|line| parse_line(line.trim(), offset))
        .collect();
    lines.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    lines
}

fn parse_line(line: &str, offset: f64) -> Option<SyncedLyricLine> {
    let caps = TIMED_LINE.captures(line)?;
    let minutes: f64 = caps[1].parse().ok()?;
    let seconds: f64 = caps[2].parse().ok()?;
    let text = caps[3].trim();
    if text.is_empty() {
        return None;
    }
    Some(SyncedLyricLine {
        text: text.to_owned(),
        timestamp: minutes * 60.0 + seconds - offset,
    })
}

/// Last line whose timestamp is not after `elapsed`.
pub fn line_at(lines: &[SyncedLyricLine], elapsed: f64) -> Option<usize> {
    if elapsed.is_nan() {
        return None;
    }
    lines
        .partition_point(|line| line.timestamp <= elapsed)
        .checked_sub(1)
}
