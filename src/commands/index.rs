// SPDX-License-Identifier: MIT OR Apache-2.0

//! `simscan index`: add files to the repository.

use anyhow::{bail, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use simscan::extract::{PlainTextExtractor, TextExtractor};
use simscan::store::Scope;
use simscan::utils::DATA_DIR;
use simscan::{Error, IndexRequest, SimilarityEngine};

use super::{describe_scope, Context};

/// Outcome of indexing one file.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub file: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub chunk_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Indexed,
    Skipped,
    Failed,
}

/// How each file becomes a document.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub id: Option<String>,
    pub scope: Scope,
    /// Drop earlier documents with the same name once the new one is stored.
    pub replace: bool,
}

pub fn run(ctx: &Context, path: &Path, options: IndexOptions) -> Result<()> {
    let extractor = PlainTextExtractor;

    let files = if path.is_dir() {
        if options.id.is_some() {
            bail!("--id can only be used when indexing a single file");
        }
        collect_files(path, &extractor)
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        bail!("Path not found: {}", path.display());
    };

    let engine = ctx.open_engine()?;
    let root = if path.is_dir() { path } else { path.parent().unwrap_or(path) };

    let pb = if ctx.is_json() || files.len() < 2 {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} files | Indexing {msg}")
                .expect("valid progress bar template")
                .progress_chars("##."),
        );
        pb
    };

    let mut reports = Vec::with_capacity(files.len());
    for file in &files {
        let name = display_name(root, file);
        pb.set_message(name.clone());
        let report = index_file(ctx, &engine, &extractor, file, name, &options)?;
        if !ctx.is_json() {
            pb.suspend(|| print_report(&report, ctx.use_color));
        }
        reports.push(report);
        pb.inc(1);
    }
    pb.finish_and_clear();

    if ctx.is_json() {
        ctx.print_json(&reports)?;
    } else {
        let indexed = reports
            .iter()
            .filter(|r| r.status == FileStatus::Indexed)
            .count();
        println!(
            "{} {} of {} file(s) indexed into {}",
            "✓".green(),
            indexed,
            reports.len(),
            describe_scope(Some(&options.scope))
        );
    }
    Ok(())
}

/// Indexes one file. Request-level failures (unreadable file, no text,
/// already indexed) become a report; anything else aborts.
pub fn index_file(
    ctx: &Context,
    engine: &SimilarityEngine,
    extractor: &dyn TextExtractor,
    path: &Path,
    name: String,
    options: &IndexOptions,
) -> Result<FileReport> {
    let outcome = extractor.extract(path).and_then(|extracted| {
        let mut request = IndexRequest::new(name.clone(), extracted.text)
            .with_unit_count(extracted.unit_count)
            .with_scope(options.scope.clone())
            .with_timeout(ctx.timeout)
            .with_replace(options.replace);
        if let Some(id) = &options.id {
            request = request.with_id(id.clone());
        }
        engine.index_document(request)
    });

    match outcome {
        Ok(outcome) => Ok(FileReport {
            file: name,
            status: FileStatus::Indexed,
            document_id: Some(outcome.document_id),
            chunk_count: outcome.chunk_count,
            message: index_message(outcome.skipped_chunks, &outcome.replaced),
        }),
        Err(Error::DuplicateDocument(existing)) => Ok(FileReport {
            file: name,
            status: FileStatus::Skipped,
            document_id: Some(existing),
            chunk_count: 0,
            message: Some("already indexed".to_string()),
        }),
        Err(err) if err.is_recoverable() => {
            tracing::warn!(file = %name, error = %err, "file not indexed");
            Ok(FileReport {
                file: name,
                status: FileStatus::Failed,
                document_id: None,
                chunk_count: 0,
                message: Some(err.to_string()),
            })
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!("Failed to index {}", name))),
    }
}

fn index_message(skipped_chunks: usize, replaced: &[String]) -> Option<String> {
    let mut notes = Vec::new();
    if skipped_chunks > 0 {
        notes.push(format!("{} chunk(s) could not be embedded", skipped_chunks));
    }
    if !replaced.is_empty() {
        notes.push(format!("replaced {}", replaced.join(", ")));
    }
    (!notes.is_empty()).then(|| notes.join("; "))
}

/// Supported files under `root`, sorted, skipping hidden entries.
pub fn collect_files(root: &Path, extractor: &dyn TextExtractor) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| extractor.supports(path))
        .collect();
    files.sort();
    files
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('.') || name == DATA_DIR
}

/// File name relative to the indexed root.
pub fn display_name(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .unwrap_or(file)
        .display()
        .to_string()
}

pub fn print_report(report: &FileReport, use_color: bool) {
    let file = simscan::output::colorize_path(&report.file, use_color);
    match report.status {
        FileStatus::Indexed => {
            let id = report.document_id.as_deref().unwrap_or_default();
            println!(
                "{} {} as {} ({} chunks)",
                "✓".green(),
                file,
                simscan::output::colorize_id(id, use_color),
                report.chunk_count
            );
            if let Some(message) = &report.message {
                println!("  {}", message.yellow());
            }
        }
        FileStatus::Skipped => {
            println!(
                "{} {} skipped: {}",
                "-".dimmed(),
                file,
                report.message.as_deref().unwrap_or_default()
            );
        }
        FileStatus::Failed => {
            println!(
                "{} {}: {}",
                "✗".red(),
                file,
                report.message.as_deref().unwrap_or_default()
            );
        }
    }
}
