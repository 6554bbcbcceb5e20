//! Ingestion pipeline orchestration.
//!
//! Coordinates the write path for one source document:
//! extract → normalize → chunk → create document row → embed and persist in
//! fixed-size sequential batches. Batches run one at a time to respect
//! embedding backend rate limits. If any batch fails to embed, the whole
//! ingestion aborts with an explicit error — the document is never left
//! silently half-indexed. Re-ingesting the same source always creates a new
//! document; deduplication is the caller's responsibility.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::errors::PipelineError;
use crate::extract;
use crate::normalize::normalize;
use crate::store::{self, ChunkRecord};

pub struct IngestOutcome {
    pub document_id: String,
    pub chunk_count: usize,
    pub batch_count: usize,
}

/// Ingest one source file. `chunk_size`/`overlap` override the configured
/// chunking parameters when given.
pub async fn ingest_file(
    config: &Config,
    path: &Path,
    name: &str,
    source_url: Option<&str>,
    uploaded_by: &str,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
) -> Result<IngestOutcome> {
    let chunk_size = chunk_size.unwrap_or(config.chunking.chunk_size);
    let overlap = overlap.unwrap_or(config.chunking.overlap);
    if chunk_size == 0 {
        return Err(PipelineError::input("chunk size must be > 0"));
    }
    if overlap >= chunk_size {
        return Err(PipelineError::input("overlap must be < chunk size"));
    }

    let raw = extract::read_source(path)?;
    let text = normalize(&raw);

    let contents = chunk_text(&text, chunk_size, overlap);
    if contents.is_empty() {
        return Err(PipelineError::source_format(format!(
            "{} produced no indexable chunks (no content to index)",
            path.display()
        )));
    }

    let file_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unknown")
        .to_string();

    // Resolve the backend up front so misconfiguration (missing credential,
    // unknown model) fails before any rows are written.
    let provider = embedding::create_provider(&config.embedding)?;
    info!(
        model = provider.model_name(),
        dims = provider.dims(),
        "embedding backend ready"
    );

    let pool = db::open_pool(&config.db.path).await?;
    let document_id = store::insert_document(&pool, name, source_url, uploaded_by).await?;

    let batch_size = config.embedding.batch_size;
    let mut next_index: i64 = 0;
    let mut batch_count = 0usize;

    // Sequential batches: embed, then persist, then move on. A failed batch
    // aborts everything after it, so the error below names the document and
    // how far ingestion got instead of hiding the partial coverage.
    for batch in contents.chunks(batch_size) {
        let vectors = embedding::embed_texts(&config.embedding, batch)
            .await
            .with_context(|| {
                format!(
                    "ingestion aborted: document {} has only {} of {} chunks persisted",
                    document_id, next_index, contents.len()
                )
            })?;

        let records: Vec<ChunkRecord> = batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(content, embedding)| ChunkRecord { content, embedding })
            .collect();

        store::insert_chunks(&pool, &document_id, &file_name, next_index, &records).await?;
        next_index += records.len() as i64;
        batch_count += 1;
    }

    info!(
        document_id = %document_id,
        chunks = contents.len(),
        batches = batch_count,
        "ingested {}", name
    );

    pool.close().await;

    Ok(IngestOutcome {
        document_id,
        chunk_count: contents.len(),
        batch_count,
    })
}

/// CLI entry point — runs the ingestion and prints a summary.
#[allow(clippy::too_many_arguments)]
pub async fn run_ingest(
    config: &Config,
    path: &Path,
    name: &str,
    source_url: Option<&str>,
    uploaded_by: &str,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
) -> Result<()> {
    let outcome = ingest_file(
        config,
        path,
        name,
        source_url,
        uploaded_by,
        chunk_size,
        overlap,
    )
    .await?;

    println!("ingest {}", name);
    println!("  source: {}", path.display());
    println!("  chunks written: {}", outcome.chunk_count);
    println!("  embedding batches: {}", outcome.batch_count);
    println!("  document: {}", outcome.document_id);
    println!("ok");

    Ok(())
}
