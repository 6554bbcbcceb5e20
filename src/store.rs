//! Vector store and record persistence.
//!
//! A thin facade over SQLite exposing exactly the operations the pipeline
//! needs: document/chunk inserts on the write path, nearest-neighbor search
//! and batched document lookup on the read path, and query/ticket records.
//! Nearest-neighbor search is exact: every stored vector is scored with
//! cosine similarity in process and the top k kept. That is fine at the
//! corpus sizes this tool targets; swapping in an indexed store only has to
//! honor this module's signatures.

use std::collections::HashMap;

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::errors::PipelineError;

/// A chunk scored against a query vector.
#[derive(Debug, Clone)]
pub struct NearestChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_index: i64,
    pub file: String,
    pub similarity: f32,
}

/// Document metadata attached to retrieval results.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub id: String,
    pub name: String,
    pub source_url: Option<String>,
}

/// A chunk ready for persistence: content plus its embedding.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub content: String,
    pub embedding: Vec<f32>,
}

pub async fn insert_document(
    pool: &SqlitePool,
    name: &str,
    source_url: Option<&str>,
    uploaded_by: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO documents (id, name, source_url, uploaded_by, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(source_url)
    .bind(uploaded_by)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| PipelineError::persistence(format!("insert document: {}", e)))?;

    Ok(id)
}

/// Insert a batch of chunks. `start_index` is the chunk index of the first
/// record so sequential batches keep contiguous indices per document.
pub async fn insert_chunks(
    pool: &SqlitePool,
    document_id: &str,
    file: &str,
    start_index: i64,
    records: &[ChunkRecord],
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| PipelineError::persistence(format!("begin chunk batch: {}", e)))?;

    for (offset, record) in records.iter().enumerate() {
        let id = Uuid::new_v4().to_string();
        let blob = vec_to_blob(&record.embedding);

        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, content, embedding, file) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(document_id)
        .bind(start_index + offset as i64)
        .bind(&record.content)
        .bind(&blob)
        .bind(file)
        .execute(&mut *tx)
        .await
        .map_err(|e| PipelineError::persistence(format!("insert chunk: {}", e)))?;
    }

    tx.commit()
        .await
        .map_err(|e| PipelineError::persistence(format!("commit chunk batch: {}", e)))?;
    Ok(())
}

/// Exact top-k nearest chunks by cosine similarity, best first. Ordering is
/// deterministic: ties break on chunk id.
pub async fn nearest_chunks(
    pool: &SqlitePool,
    query_vec: &[f32],
    k: usize,
) -> Result<Vec<NearestChunk>> {
    let rows = sqlx::query(
        "SELECT id, document_id, chunk_index, content, embedding, file FROM chunks",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| PipelineError::retrieval(format!("vector scan: {}", e)))?;

    let mut scored: Vec<NearestChunk> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = blob_to_vec(&blob);
            NearestChunk {
                chunk_id: row.get("id"),
                document_id: row.get("document_id"),
                content: row.get("content"),
                chunk_index: row.get("chunk_index"),
                file: row.get("file"),
                similarity: cosine_similarity(query_vec, &vec),
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    scored.truncate(k);

    Ok(scored)
}

/// Fetch document metadata for a set of ids in one query.
pub async fn documents_by_ids(
    pool: &SqlitePool,
    ids: &[String],
) -> Result<HashMap<String, DocumentMeta>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT id, name, source_url FROM documents WHERE id IN ({})",
        placeholders
    );

    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| PipelineError::retrieval(format!("document lookup: {}", e)))?;

    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        let meta = DocumentMeta {
            id: row.get("id"),
            name: row.get("name"),
            source_url: row.get("source_url"),
        };
        map.insert(meta.id.clone(), meta);
    }
    Ok(map)
}

pub async fn insert_query(
    pool: &SqlitePool,
    question: &str,
    answer: &str,
    confidence: f64,
    citations_json: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO queries (id, question, answer, confidence, citations_json, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(question)
    .bind(answer)
    .bind(confidence)
    .bind(citations_json)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| PipelineError::persistence(format!("insert query: {}", e)))?;

    Ok(id)
}

/// Open a ticket for a saved query. Tickets are only ever created after the
/// query row exists; human review closes them out of band.
pub async fn insert_ticket(pool: &SqlitePool, query_id: &str) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query("INSERT INTO tickets (id, query_id, status, created_at) VALUES (?, ?, 'open', ?)")
        .bind(&id)
        .bind(query_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| PipelineError::persistence(format!("insert ticket: {}", e)))?;

    Ok(id)
}

/// Summary row for `askdocs docs`.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub source_url: Option<String>,
    pub uploaded_by: String,
    pub created_at: i64,
    pub chunk_count: i64,
}

pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<DocumentSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT d.id, d.name, d.source_url, d.uploaded_by, d.created_at,
               COUNT(c.id) AS chunk_count
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        GROUP BY d.id
        ORDER BY d.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| PipelineError::retrieval(format!("list documents: {}", e)))?;

    Ok(rows
        .iter()
        .map(|row| DocumentSummary {
            id: row.get("id"),
            name: row.get("name"),
            source_url: row.get("source_url"),
            uploaded_by: row.get("uploaded_by"),
            created_at: row.get("created_at"),
            chunk_count: row.get("chunk_count"),
        })
        .collect())
}

/// Summary row for `askdocs queries`: answered questions with confidence
/// and whether a ticket was opened.
#[derive(Debug, Clone)]
pub struct QuerySummary {
    pub id: String,
    pub question: String,
    pub confidence: f64,
    pub created_at: i64,
    pub ticket_status: Option<String>,
}

pub async fn list_queries(pool: &SqlitePool, limit: i64) -> Result<Vec<QuerySummary>> {
    let rows = sqlx::query(
        r#"
        SELECT q.id, q.question, q.confidence, q.created_at, t.status AS ticket_status
        FROM queries q
        LEFT JOIN tickets t ON t.query_id = q.id
        ORDER BY q.created_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| PipelineError::retrieval(format!("list queries: {}", e)))?;

    Ok(rows
        .iter()
        .map(|row| QuerySummary {
            id: row.get("id"),
            question: row.get("question"),
            confidence: row.get("confidence"),
            created_at: row.get("created_at"),
            ticket_status: row.get("ticket_status"),
        })
        .collect())
}
