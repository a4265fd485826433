// SPDX-License-Identifier: MIT OR Apache-2.0

//! Directory watcher that indexes new repository files with debouncing

use anyhow::{bail, Result};
use colored::Colorize;
use notify::{
    Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};

use simscan::extract::{PlainTextExtractor, TextExtractor};
use simscan::store::Scope;
use simscan::utils::DATA_DIR;
use simscan::SimilarityEngine;

use super::index::{
    collect_files, display_name, index_file, print_report, FileStatus, IndexOptions,
};
use super::Context;

/// File system watcher with debouncing
pub struct Watcher<'a> {
    ctx: &'a Context,
    engine: SimilarityEngine,
    root: PathBuf,
    options: IndexOptions,
    debounce_duration: Duration,
    extractor: PlainTextExtractor,
}

impl<'a> Watcher<'a> {
    pub fn new(
        ctx: &'a Context,
        engine: SimilarityEngine,
        root: impl AsRef<Path>,
        scope: Scope,
        debounce_secs: u64,
    ) -> Self {
        Self {
            ctx,
            engine,
            root: root.as_ref().to_path_buf(),
            // An edited file supersedes the version indexed before it.
            options: IndexOptions {
                id: None,
                scope,
                replace: true,
            },
            debounce_duration: Duration::from_secs(debounce_secs),
            extractor: PlainTextExtractor,
        }
    }

    /// Indexes every supported file already present under the root.
    pub fn initial_scan(&self) -> Result<usize> {
        let files = collect_files(&self.root, &self.extractor);
        self.index_paths(files.iter().map(PathBuf::as_path))
    }

    /// Start watching for file changes with debouncing
    pub fn watch(&self) -> Result<()> {
        let (tx, rx) = channel();

        let config = NotifyConfig::default().with_poll_interval(Duration::from_secs(2));

        let mut watcher = RecommendedWatcher::new(tx, config)?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        println!("{} Watching {} for new documents...", "👁".cyan(), self.root.display());
        println!("  Debounce: {}s", self.debounce_duration.as_secs());
        println!("Press Ctrl+C to stop\n");

        let mut pending_paths: BTreeSet<PathBuf> = BTreeSet::new();
        let mut last_event_time: Option<Instant> = None;

        loop {
            let timeout = if pending_paths.is_empty() {
                Duration::from_secs(60)
            } else {
                self.debounce_duration
            };

            match rx.recv_timeout(timeout) {
                Ok(Ok(event)) => {
                    if should_index(&event) {
                        for path in &event.paths {
                            if self.is_candidate(path) {
                                pending_paths.insert(path.clone());
                            }
                        }
                        last_event_time = Some(Instant::now());
                    }
                }
                Ok(Err(e)) => {
                    eprintln!("{} Watch error: {}", "✗".red(), e);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    break;
                }
            }

            let settled = last_event_time
                .map(|last| last.elapsed() >= self.debounce_duration)
                .unwrap_or(false);

            if settled && !pending_paths.is_empty() {
                let batch = std::mem::take(&mut pending_paths);
                last_event_time = None;

                let existing: Vec<PathBuf> = batch.into_iter().filter(|p| p.is_file()).collect();
                if existing.is_empty() {
                    continue;
                }
                println!("{} {} file(s) changed, indexing...", "🔄".yellow(), existing.len());
                if let Err(e) = self.index_paths(existing.iter().map(PathBuf::as_path)) {
                    eprintln!("{} Indexing failed: {:#}", "✗".red(), e);
                }
            }
        }

        Ok(())
    }

    fn is_candidate(&self, path: &Path) -> bool {
        let in_data_dir = path
            .strip_prefix(&self.root)
            .map(|rel| rel.components().any(|c| c.as_os_str() == DATA_DIR))
            .unwrap_or(false);
        !in_data_dir && self.extractor.supports(path)
    }

    fn index_paths<'p>(&self, paths: impl Iterator<Item = &'p Path>) -> Result<usize> {
        let mut indexed = 0;
        for path in paths {
            let name = display_name(&self.root, path);
            let report =
                index_file(self.ctx, &self.engine, &self.extractor, path, name, &self.options)?;
            if report.status == FileStatus::Indexed {
                indexed += 1;
            }
            if report.status != FileStatus::Skipped {
                print_report(&report, self.ctx.use_color);
            }
        }
        Ok(indexed)
    }
}

/// Check if event should trigger indexing
fn should_index(event: &Event) -> bool {
    use notify::EventKind::*;
    matches!(event.kind, Create(_) | Modify(_))
}

/// Run the watch command
pub fn run(ctx: &Context, path: &Path, debounce_secs: u64, scope: Option<Scope>) -> Result<()> {
    if !path.is_dir() {
        bail!("Not a directory: {}", path.display());
    }
    let root = path.canonicalize()?;

    let engine = ctx.open_engine()?;
    let watcher = Watcher::new(ctx, engine, &root, scope.unwrap_or_default(), debounce_secs);

    let indexed = watcher.initial_scan()?;
    println!("{} Initial scan indexed {} file(s)", "✓".green(), indexed);

    watcher.watch()
}
