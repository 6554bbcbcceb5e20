//! Question answering orchestration.
//!
//! The full read path for one question: retrieve → compose → persist the
//! query record → maybe open an escalation ticket. Both the CLI `ask`
//! command and the HTTP `/query` handler call [`answer_question`].
//!
//! Ordering matters at the end: the ticket references the saved query row,
//! so it is only created after the query insert succeeds. A failed query
//! insert is logged and swallowed — the caller still gets the computed
//! answer, just without a durable record or ticket.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::answer::{self, NO_MATCH_ANSWER};
use crate::config::Config;
use crate::errors::PipelineError;
use crate::retrieve::{self, Citation};
use crate::store;

/// The response for one answered question.
#[derive(Debug, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: f64,
    #[serde(skip)]
    pub query_id: Option<String>,
    #[serde(skip)]
    pub ticket_id: Option<String>,
}

/// True iff the confidence falls strictly below the threshold. Boundary
/// equality does not escalate.
pub fn should_escalate(confidence: f64, threshold: f64) -> bool {
    confidence < threshold
}

/// Answer one question end to end.
pub async fn answer_question(
    pool: &SqlitePool,
    config: &Config,
    question: &str,
) -> Result<AskOutcome> {
    let question = question.trim();
    if question.is_empty() {
        return Err(PipelineError::input("question must not be empty"));
    }

    let retrieval = retrieve::retrieve(pool, config, question).await?;

    let (answer_text, citations) = if retrieval.is_empty() {
        // Sentinel path: nothing to cite, and the generative backend is
        // never called.
        (NO_MATCH_ANSWER.to_string(), Vec::new())
    } else {
        let context =
            retrieve::assemble_context(&retrieval.chunks, config.retrieval.context_budget);
        let text = answer::compose_answer(&config.generation, question, &context).await;
        (text, retrieve::citations(&retrieval.chunks))
    };

    let confidence = retrieval.confidence;

    let citations_json = serde_json::to_string(&citations).unwrap_or_else(|_| "[]".to_string());
    let query_id = match store::insert_query(pool, question, &answer_text, confidence, &citations_json)
        .await
    {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "failed to save query record, returning answer anyway");
            None
        }
    };

    // Tickets only ever reference a durably saved query.
    let mut ticket_id = None;
    if let Some(ref qid) = query_id {
        if should_escalate(confidence, config.escalation.threshold) {
            match store::insert_ticket(pool, qid).await {
                Ok(id) => ticket_id = Some(id),
                Err(e) => warn!(error = %e, "failed to open escalation ticket"),
            }
        }
    }

    Ok(AskOutcome {
        answer: answer_text,
        citations,
        confidence,
        query_id,
        ticket_id,
    })
}

/// CLI entry point — answers the question and prints the result.
pub async fn run_ask(config: &Config, question: &str, top_k: Option<usize>) -> Result<()> {
    let mut config = config.clone();
    if let Some(k) = top_k {
        if k == 0 {
            return Err(PipelineError::input("top-k must be >= 1"));
        }
        config.retrieval.top_k = k;
    }

    let pool = crate::db::open_pool(&config.db.path).await?;
    let outcome = answer_question(&pool, &config, question).await?;
    pool.close().await;

    println!("{}", outcome.answer);
    println!();
    println!("confidence: {:.2}", outcome.confidence);
    if !outcome.citations.is_empty() {
        println!("sources:");
        for citation in &outcome.citations {
            match &citation.source_url {
                Some(url) => println!("  - {} ({})", citation.doc_name, url),
                None => println!("  - {}", citation.doc_name),
            }
        }
    }
    if outcome.ticket_id.is_some() {
        println!("note: low confidence, escalated for human review");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_below_threshold() {
        assert!(should_escalate(0.3, 0.6));
        assert!(should_escalate(0.59, 0.6));
        assert!(should_escalate(0.0, 0.01));
    }

    #[test]
    fn test_escalation_at_or_above_threshold() {
        assert!(!should_escalate(0.6, 0.6)); // boundary: equality never escalates
        assert!(!should_escalate(0.61, 0.6));
        assert!(!should_escalate(1.0, 0.6));
    }

    #[test]
    fn test_zero_threshold_never_escalates() {
        assert!(!should_escalate(0.0, 0.0));
        assert!(!should_escalate(0.5, 0.0));
    }

    #[test]
    fn test_zero_confidence_escalates_under_positive_threshold() {
        assert!(should_escalate(0.0, 0.6));
        assert!(should_escalate(0.0, 0.001));
    }
}
