// SPDX-License-Identifier: MIT OR Apache-2.0

//! `simscan compare`: direct comparison of two files, no repository needed.

use anyhow::{Context as _, Result};
use colored::Colorize;
use std::path::Path;

use simscan::deadline::Deadline;
use simscan::engine::compare_texts;
use simscan::extract::{PlainTextExtractor, TextExtractor};
use simscan::output::{colorize_path, colorize_score, excerpt, highlight};
use simscan::text::normalize;

use super::Context;

pub fn run(
    ctx: &Context,
    first: &Path,
    second: &Path,
    min_match: Option<usize>,
    show_highlight: bool,
) -> Result<()> {
    let a = PlainTextExtractor
        .extract(first)
        .with_context(|| format!("Failed to read {}", first.display()))?;
    let b = PlainTextExtractor
        .extract(second)
        .with_context(|| format!("Failed to read {}", second.display()))?;

    let min_match = min_match.unwrap_or_else(|| ctx.config.search.compare_min_match_length());
    let comparison = compare_texts(
        &ctx.chunker()?,
        &a.text,
        &b.text,
        min_match,
        &Deadline::after(ctx.timeout),
    )?;

    if ctx.is_json() {
        return ctx.print_json(&comparison);
    }

    let color = ctx.use_color;
    println!(
        "{} {} of {} is found in {}",
        "▸".cyan(),
        colorize_score(comparison.score, color),
        colorize_path(&second.display().to_string(), color),
        colorize_path(&first.display().to_string(), color)
    );
    for segment in &comparison.segments {
        println!(
            "  {}..{} (at {} in {}) {}",
            segment.start,
            segment.end,
            segment.source_match_start,
            first.display(),
            format!("\"{}\"", excerpt(&segment.text, 80)).dimmed()
        );
    }
    if show_highlight {
        println!();
        println!("{}", highlight(&normalize(&b.text), &comparison.segments, color));
    }
    Ok(())
}
