//! Similarity retrieval and context assembly.
//!
//! The read path's first half: embed the question with the same backend used
//! at ingestion time, pull the top-k most similar chunks, resolve their
//! owning documents in one batched lookup, and derive a confidence score.
//!
//! Confidence is the similarity of the single best-ranked match, clamped to
//! `[0, 1]`. That is a deliberate top-1 proxy, not an aggregate over the
//! result set; the tests pin this behavior so changing it is a conscious
//! decision.
//!
//! Context assembly packs ranked blocks under a fixed character budget.
//! Blocks are whole or absent: assembly stops at the first block that would
//! overflow, so the highest-similarity material always gets in first.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::embedding;
use crate::store;

/// Separator between context blocks.
const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Maximum characters in a citation snippet before the ellipsis.
const SNIPPET_CHARS: usize = 240;

/// A retrieved chunk with its rank and resolved document metadata.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub rank: usize,
    pub document_id: String,
    pub document_name: String,
    pub source_url: Option<String>,
    pub content: String,
    pub similarity: f32,
}

/// Source reference embedded in a query record and returned to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub doc_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub snippet: String,
    pub similarity: f32,
}

/// Retrieval result: ranked chunks plus the derived confidence.
#[derive(Debug)]
pub struct Retrieval {
    pub chunks: Vec<RankedChunk>,
    pub confidence: f64,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Embed the question and fetch the top-k nearest chunks with document
/// metadata attached. Zero matches yields the sentinel result
/// (`confidence = 0.0`, no chunks); callers must not invoke the generative
/// backend for it.
pub async fn retrieve(pool: &SqlitePool, config: &Config, question: &str) -> Result<Retrieval> {
    let query_vec = embedding::embed_query(&config.embedding, question).await?;

    let matches = store::nearest_chunks(pool, &query_vec, config.retrieval.top_k).await?;
    if matches.is_empty() {
        return Ok(Retrieval {
            chunks: Vec::new(),
            confidence: 0.0,
        });
    }

    // One lookup for the distinct document set, not one per chunk.
    let mut doc_ids: Vec<String> = matches.iter().map(|m| m.document_id.clone()).collect();
    doc_ids.sort();
    doc_ids.dedup();
    let docs = store::documents_by_ids(pool, &doc_ids).await?;

    let chunks: Vec<RankedChunk> = matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let meta = docs.get(&m.document_id);
            RankedChunk {
                rank: i + 1,
                document_id: m.document_id.clone(),
                document_name: meta
                    .map(|d| d.name.clone())
                    .unwrap_or_else(|| m.file.clone()),
                source_url: meta.and_then(|d| d.source_url.clone()),
                content: m.content.clone(),
                similarity: m.similarity,
            }
        })
        .collect();

    let confidence = confidence_from_top_match(chunks[0].similarity);

    Ok(Retrieval { chunks, confidence })
}

/// Top-1 similarity clamped into `[0, 1]`. Raw cosine similarity can be
/// negative; stores with other metrics can exceed 1.
pub fn confidence_from_top_match(similarity: f32) -> f64 {
    (similarity as f64).clamp(0.0, 1.0)
}

/// Assemble the generation context from ranked chunks under a character
/// budget. Each block is `"# [<rank>] <documentName>\n<content>"`; blocks
/// are joined with a separator and added whole, in rank order, until the
/// next one would exceed the budget.
pub fn assemble_context(chunks: &[RankedChunk], budget: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for chunk in chunks {
        let block = format!("# [{}] {}\n{}", chunk.rank, chunk.document_name, chunk.content);
        let block_len = block.chars().count();
        let cost = if context.is_empty() {
            block_len
        } else {
            BLOCK_SEPARATOR.len() + block_len
        };

        if used + cost > budget {
            break;
        }

        if !context.is_empty() {
            context.push_str(BLOCK_SEPARATOR);
        }
        context.push_str(&block);
        used += cost;
    }

    context
}

/// Derive the citation list from ranked chunks.
pub fn citations(chunks: &[RankedChunk]) -> Vec<Citation> {
    chunks
        .iter()
        .map(|c| Citation {
            doc_name: c.document_name.clone(),
            source_url: c.source_url.clone(),
            snippet: snippet(&c.content),
            similarity: c.similarity,
        })
        .collect()
}

/// First `SNIPPET_CHARS` characters of the content, with an ellipsis when
/// truncated.
fn snippet(content: &str) -> String {
    let flattened = content.replace('\n', " ");
    let trimmed = flattened.trim();
    if trimmed.chars().count() <= SNIPPET_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(SNIPPET_CHARS).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(rank: usize, name: &str, content: &str, similarity: f32) -> RankedChunk {
        RankedChunk {
            rank,
            document_id: format!("doc-{}", rank),
            document_name: name.to_string(),
            source_url: None,
            content: content.to_string(),
            similarity,
        }
    }

    #[test]
    fn test_confidence_clamped_to_unit_interval() {
        assert_eq!(confidence_from_top_match(-0.3), 0.0);
        assert_eq!(confidence_from_top_match(0.0), 0.0);
        assert!((confidence_from_top_match(0.82) - 0.82).abs() < 1e-6);
        assert_eq!(confidence_from_top_match(1.7), 1.0);
    }

    #[test]
    fn test_context_block_format() {
        let chunks = vec![ranked(1, "Handbook", "Refunds take 5 days.", 0.9)];
        let ctx = assemble_context(&chunks, 9000);
        assert_eq!(ctx, "# [1] Handbook\nRefunds take 5 days.");
    }

    #[test]
    fn test_context_joins_blocks_with_separator() {
        let chunks = vec![
            ranked(1, "A", "first", 0.9),
            ranked(2, "B", "second", 0.8),
        ];
        let ctx = assemble_context(&chunks, 9000);
        assert_eq!(ctx, "# [1] A\nfirst\n\n---\n\n# [2] B\nsecond");
    }

    #[test]
    fn test_context_never_exceeds_budget() {
        let chunks: Vec<RankedChunk> = (1..=20)
            .map(|i| ranked(i, "Doc", &"x".repeat(400), 0.5))
            .collect();
        for budget in [100, 500, 1000, 3000, 9000] {
            let ctx = assemble_context(&chunks, budget);
            assert!(
                ctx.chars().count() <= budget,
                "context {} chars exceeds budget {}",
                ctx.chars().count(),
                budget
            );
        }
    }

    #[test]
    fn test_context_stops_at_whole_block_boundary() {
        let chunks = vec![
            ranked(1, "A", &"a".repeat(100), 0.9),
            ranked(2, "B", &"b".repeat(100), 0.8),
            ranked(3, "C", &"c".repeat(100), 0.7),
        ];
        // Budget fits the first two blocks but not the third.
        let two_blocks = assemble_context(&chunks[..2], 9000).chars().count();
        let ctx = assemble_context(&chunks, two_blocks + 10);
        assert!(ctx.contains("# [1] A"));
        assert!(ctx.contains("# [2] B"));
        assert!(!ctx.contains("# [3] C"), "third block must be absent, not truncated");
        assert!(!ctx.contains('c'), "no partial content from the dropped block");
    }

    #[test]
    fn test_context_preserves_rank_order() {
        let chunks = vec![
            ranked(1, "First", "one", 0.9),
            ranked(2, "Second", "two", 0.8),
            ranked(3, "Third", "three", 0.7),
        ];
        let ctx = assemble_context(&chunks, 9000);
        let p1 = ctx.find("# [1] First").unwrap();
        let p2 = ctx.find("# [2] Second").unwrap();
        let p3 = ctx.find("# [3] Third").unwrap();
        assert!(p1 < p2 && p2 < p3);
    }

    #[test]
    fn test_empty_chunks_give_empty_context() {
        assert_eq!(assemble_context(&[], 9000), "");
    }

    #[test]
    fn test_snippet_short_content_untruncated() {
        assert_eq!(snippet("short answer"), "short answer");
    }

    #[test]
    fn test_snippet_truncates_with_ellipsis() {
        let long = "y".repeat(500);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), 241); // 240 + ellipsis
        assert!(s.ends_with('…'));
    }

    #[test]
    fn test_snippet_flattens_newlines() {
        assert_eq!(snippet("line one\nline two"), "line one line two");
    }

    #[test]
    fn test_citations_carry_metadata() {
        let mut chunk = ranked(1, "Guide", "content here", 0.77);
        chunk.source_url = Some("https://example.com/guide".to_string());
        let cites = citations(&[chunk]);
        assert_eq!(cites.len(), 1);
        assert_eq!(cites[0].doc_name, "Guide");
        assert_eq!(cites[0].source_url.as_deref(), Some("https://example.com/guide"));
        assert!((cites[0].similarity - 0.77).abs() < 1e-6);
    }

    #[test]
    fn test_citation_serializes_camel_case() {
        let cites = citations(&[ranked(1, "Guide", "text", 0.5)]);
        let json = serde_json::to_value(&cites[0]).unwrap();
        assert!(json.get("docName").is_some());
        assert!(json.get("snippet").is_some());
        // absent URL is omitted, not null
        assert!(json.get("sourceUrl").is_none());
    }
}
