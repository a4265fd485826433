// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repository maintenance: `list`, `delete`, `stats`, `reindex`.

use anyhow::{bail, Result};
use colored::Colorize;

use simscan::output::{colorize_id, colorize_path};
use simscan::store::{DocumentStore, Scope};

use super::{describe_scope, Context};

pub fn list(ctx: &Context, scope: Option<Scope>) -> Result<()> {
    let store = ctx.open_store()?;
    let documents = store.list_documents(scope.as_ref())?;

    if ctx.is_json() {
        return ctx.print_json(&documents);
    }

    if documents.is_empty() {
        println!("No documents in {}", describe_scope(scope.as_ref()));
        return Ok(());
    }
    for doc in &documents {
        println!(
            "{}  {}  {} chars, {} chunks, {} page(s), {}",
            colorize_id(&doc.id, ctx.use_color),
            colorize_path(&doc.file_name, ctx.use_color),
            doc.length,
            doc.chunk_count,
            doc.unit_count,
            doc.scope
        );
    }
    println!("{} document(s)", documents.len());
    Ok(())
}

pub fn delete(ctx: &Context, id: &str) -> Result<()> {
    let engine = ctx.open_engine()?;
    if !engine.delete_document(id)? {
        bail!("No document with id {}", id);
    }

    if ctx.is_json() {
        ctx.print_json(&serde_json::json!({ "deleted": id }))
    } else {
        println!("{} Deleted {}", "✓".green(), id);
        Ok(())
    }
}

pub fn stats(ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let stats = engine.stats()?;

    if ctx.is_json() {
        return ctx.print_json(&stats);
    }

    println!("Repository: {}", ctx.data_dir.display());
    println!("  Documents:   {}", stats.documents);
    println!("  Chunks:      {}", stats.chunks);
    println!("  Embeddings:  {}", stats.embeddings);
    println!(
        "  Vectors:     {} live / {} allocated",
        stats.live_vectors, stats.index_vectors
    );
    println!("  Model:       {} ({} dims)", stats.model_id, stats.dimension);
    Ok(())
}

pub fn reindex(ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine_fresh()?;
    let outcome = engine.rebuild_index()?;

    if ctx.is_json() {
        return ctx.print_json(&outcome);
    }

    println!(
        "{} Rebuilt index with {} vector(s) ({} re-encoded, {} skipped)",
        "✓".green(),
        outcome.vectors,
        outcome.reencoded,
        outcome.skipped_chunks
    );
    Ok(())
}
