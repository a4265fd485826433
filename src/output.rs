// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;

use crate::matching::MatchSegment;
use crate::text::slice_chars;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize file name (cyan)
pub fn colorize_path(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a percentage: red from 50, yellow from 20, green below
pub fn colorize_score(score: f64, use_color: bool) -> String {
    let text = format!("{:.1}%", score);
    if !use_color {
        return text;
    }
    if score >= 50.0 {
        text.red().bold().to_string()
    } else if score >= 20.0 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

/// Colorize match highlight (red bold)
pub fn colorize_match(text: &str, use_color: bool) -> String {
    if use_color {
        text.red().bold().to_string()
    } else {
        format!("[[{}]]", text)
    }
}

/// Colorize context text (dimmed)
pub fn colorize_context(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize document id (bold)
pub fn colorize_id(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Renders `text` with every segment highlighted. Segments must be
/// ascending and non-overlapping, as produced by the matcher.
pub fn highlight(text: &str, segments: &[MatchSegment], use_color: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for segment in segments {
        let start = segment.start.clamp(cursor, chars.len());
        let end = segment.end.clamp(start, chars.len());
        if start > cursor {
            out.push_str(&colorize_context(&slice_chars(&chars, cursor, start), use_color));
        }
        if end > start {
            out.push_str(&colorize_match(&slice_chars(&chars, start, end), use_color));
        }
        cursor = end;
    }
    if cursor < chars.len() {
        out.push_str(&colorize_context(
            &slice_chars(&chars, cursor, chars.len()),
            use_color,
        ));
    }
    out
}

/// Shortens long segment text for one-line display.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", head)
}
