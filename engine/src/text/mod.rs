//! # Text Wrapping
//!
//! Greedy line breaking over UAX#14 break opportunities.
//!
//! The planner never talks to fonts directly: it asks a [`TextMeasure`] how
//! wide a run of text is and wraps against the target column width. The
//! [`FontContext`](crate::font::FontContext) is the production implementation.

use crate::style::FontRole;
use unicode_linebreak::{linebreaks, BreakOpportunity};

/// Width measurement supplied by the rendering side.
pub trait TextMeasure {
    /// Width of `text` in points when set in `role` at `font_size`.
    fn measure(&self, text: &str, role: FontRole, font_size: f64) -> f64;
}

/// Compute UAX#14 break opportunities indexed by char position.
///
/// Entry `i` is the opportunity to break *before* char `i`. Index 0 is
/// always `None`.
fn compute_break_opportunities(text: &str) -> Vec<Option<BreakOpportunity>> {
    let char_count = text.chars().count();
    let mut result = vec![None; char_count];

    let mut byte_to_char = vec![0usize; text.len() + 1];
    for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
        byte_to_char[byte_idx] = char_idx;
    }
    byte_to_char[text.len()] = char_count;

    for (byte_offset, opp) in linebreaks(text) {
        let char_idx = byte_to_char[byte_offset];
        if char_idx > 0 && char_idx < char_count {
            result[char_idx] = Some(opp);
        }
    }

    result
}

fn is_newline(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Break `text` into lines no wider than `max_width`.
///
/// Lines break at UAX#14 opportunities; a word wider than the whole line is
/// split between characters so nothing overflows horizontally. Trailing
/// whitespace is dropped from each line. Empty input yields no lines.
pub fn wrap_text(
    measure: &dyn TextMeasure,
    text: &str,
    role: FontRole,
    font_size: f64,
    max_width: f64,
) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let widths: Vec<f64> = chars
        .iter()
        .map(|&ch| {
            if is_newline(ch) {
                0.0
            } else {
                let mut buf = [0u8; 4];
                measure.measure(ch.encode_utf8(&mut buf), role, font_size)
            }
        })
        .collect();
    let breaks = compute_break_opportunities(text);

    let mut lines = Vec::new();
    let mut line_start = 0usize;
    let mut line_width = 0.0;
    let mut last_break: Option<usize> = None;

    let mut i = 0usize;
    while i < chars.len() {
        match breaks[i] {
            Some(BreakOpportunity::Mandatory) => {
                push_line(&mut lines, &chars[line_start..i]);
                line_start = i;
                line_width = 0.0;
                last_break = None;
            }
            Some(BreakOpportunity::Allowed) => last_break = Some(i),
            None => {}
        }

        // Whitespace may hang past the edge; it is trimmed from the line.
        let hangs = chars[i].is_whitespace();

        let w = widths[i];
        if !hangs && line_width + w > max_width && i > line_start {
            let break_at = match last_break {
                Some(bp) if bp > line_start => bp,
                _ => i,
            };
            push_line(&mut lines, &chars[line_start..break_at]);
            line_start = break_at;
            while line_start < i && chars[line_start].is_whitespace() {
                line_start += 1;
            }
            last_break = None;
            line_width = widths[line_start..i].iter().sum();
        }

        line_width += w;
        i += 1;
    }

    if line_start < chars.len() {
        push_line(&mut lines, &chars[line_start..]);
    }

    lines
}

fn push_line(lines: &mut Vec<String>, chars: &[char]) {
    let line: String = chars.iter().filter(|c| !is_newline(**c)).collect();
    lines.push(line.trim_end().to_string());
}
