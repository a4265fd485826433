// SPDX-License-Identifier: MIT OR Apache-2.0

//! `simscan scan`: check a file against the repository.

use anyhow::{Context as _, Result};
use colored::Colorize;
use std::path::Path;

use simscan::extract::{PlainTextExtractor, TextExtractor};
use simscan::output::{colorize_id, colorize_path, colorize_score, excerpt, highlight};
use simscan::store::Scope;
use simscan::text::normalize;
use simscan::{ScanReport, SearchOptions};

use super::{describe_scope, Context};

const EXCERPT_CHARS: usize = 80;

pub struct ScanArgs {
    pub top_k: Option<usize>,
    pub threshold: Option<f32>,
    pub min_match: Option<usize>,
    pub highlight: bool,
    pub scope: Option<Scope>,
}

pub fn run(ctx: &Context, path: &Path, args: ScanArgs) -> Result<()> {
    let extracted = PlainTextExtractor
        .extract(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let search = &ctx.config.search;
    let options = SearchOptions {
        top_k: args.top_k.unwrap_or_else(|| search.top_k()),
        threshold: args.threshold.unwrap_or_else(|| search.threshold()),
        min_match_length: args.min_match.unwrap_or_else(|| search.min_match_length()),
        scope: args.scope,
        timeout: ctx.timeout,
    };

    let engine = ctx.open_engine()?;
    let report = engine
        .search(&extracted.text, &options)
        .with_context(|| format!("Failed to scan {}", path.display()))?;

    if ctx.is_json() {
        return ctx.print_json(&report);
    }

    print_report(ctx, &path.display().to_string(), &report, &options);
    if args.highlight {
        if let Some(best) = report.matches.first() {
            println!();
            println!(
                "{}",
                highlight(&normalize(&extracted.text), &best.segments, ctx.use_color)
            );
        }
    }
    Ok(())
}

fn print_report(ctx: &Context, name: &str, report: &ScanReport, options: &SearchOptions) {
    let color = ctx.use_color;
    println!(
        "{} {}: {} similar ({} semantic, {} lexical) against {}",
        "▸".cyan(),
        colorize_path(name, color),
        colorize_score(report.overall_similarity, color),
        colorize_score(report.semantic_similarity, color),
        colorize_score(report.lexical_similarity, color),
        describe_scope(options.scope.as_ref())
    );
    println!(
        "  {} chars, {} chunk(s){}",
        report.query_length,
        report.query_chunk_count,
        if report.skipped_chunks > 0 {
            format!(", {} skipped", report.skipped_chunks)
        } else {
            String::new()
        }
    );

    if report.matches.is_empty() {
        println!("  {}", "No overlapping documents found".dimmed());
        return;
    }

    for (rank, result) in report.matches.iter().enumerate() {
        println!(
            "{:>3}. {} [{}] similarity {} semantic {} words {}",
            rank + 1,
            colorize_path(&result.source_filename, color),
            colorize_id(&result.document_id, color),
            colorize_score(result.similarity_score, color),
            colorize_score(result.semantic_score, color),
            colorize_score(result.word_overlap, color)
        );
        for segment in &result.segments {
            println!(
                "       {}..{} {}",
                segment.start,
                segment.end,
                format!("\"{}\"", excerpt(&segment.text, EXCERPT_CHARS)).dimmed()
            );
        }
    }
}
