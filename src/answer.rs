//! Answer composition.
//!
//! The read path's second half. The primary path sends the question and
//! assembled context to an OpenAI-compatible chat-completions backend with a
//! fixed instruction: answer only from the context, cite documents by name,
//! admit insufficient evidence instead of fabricating.
//!
//! Generation failures never reach the caller as errors. Any failure —
//! missing credential, transport error, non-success status, malformed
//! response — drops to [`extractive_fallback`], which deterministically
//! summarizes the leading context blocks and never fails. Producing *an*
//! answer outranks surfacing the backend's specific failure.

use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::config::GenerationConfig;
use crate::errors::PipelineError;

/// Fixed answer when retrieval found nothing to cite.
pub const NO_MATCH_ANSWER: &str =
    "I don't have enough information in the indexed documents to answer that. \
     Try rephrasing the question, or ask a teammate to upload the relevant document.";

/// Number of context blocks summarized by the extractive fallback.
const FALLBACK_BLOCKS: usize = 3;

/// Characters of each block's body quoted by the fallback.
const FALLBACK_SNIPPET_CHARS: usize = 300;

/// Compose an answer for the question from the assembled context.
///
/// Infallible by design: if the generative backend is disabled or fails in
/// any way, the extractive fallback supplies the answer.
pub async fn compose_answer(config: &GenerationConfig, question: &str, context: &str) -> String {
    if config.provider == "disabled" {
        return extractive_fallback(context);
    }

    match generate(config, question, context).await {
        Ok(answer) if !answer.trim().is_empty() => answer,
        Ok(_) => {
            warn!("generation backend returned an empty answer, using extractive fallback");
            extractive_fallback(context)
        }
        Err(e) => {
            warn!(error = %e, "generation failed, using extractive fallback");
            extractive_fallback(context)
        }
    }
}

/// One chat-completions call. Context is hard-truncated to
/// `prompt_char_limit` first so an oversized prompt cannot bounce the
/// request.
async fn generate(config: &GenerationConfig, question: &str, context: &str) -> Result<String> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| PipelineError::generation("OPENAI_API_KEY not set"))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| PipelineError::generation("generation.model not configured"))?;

    let context = truncate_chars(context, config.prompt_char_limit);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| PipelineError::generation(e.to_string()))?;

    let base = config
        .base_url
        .as_deref()
        .unwrap_or("https://api.openai.com")
        .trim_end_matches('/');
    let url = format!("{}/v1/chat/completions", base);

    let system = "You answer questions about internal documents. Use ONLY the provided \
                  context. Cite the documents you draw from by name. If the context does \
                  not contain the answer, say so plainly instead of guessing.";
    let user = format!("Context:\n{}\n\nQuestion: {}", context, question);

    let body = serde_json::json!({
        "model": model,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ],
    });

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| PipelineError::generation(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(PipelineError::generation(format!(
            "generation API error {}: {}",
            status, body_text
        )));
    }

    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| PipelineError::generation(e.to_string()))?;

    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| PipelineError::generation("invalid response: missing message content"))
}

/// Deterministic extractive answer from the leading context blocks.
///
/// Never fails and never returns an empty string for non-empty context:
/// each of the first few blocks contributes a bullet with its title line and
/// a leading snippet of its body, followed by a prompt to narrow the
/// question.
pub fn extractive_fallback(context: &str) -> String {
    if context.trim().is_empty() {
        return NO_MATCH_ANSWER.to_string();
    }

    let mut bullets = Vec::new();
    for block in context.split("\n\n---\n\n").take(FALLBACK_BLOCKS) {
        let mut lines = block.lines();
        let title = lines
            .next()
            .unwrap_or("")
            .trim_start_matches('#')
            .trim()
            .to_string();
        let body: String = lines.collect::<Vec<_>>().join(" ");
        let snippet = truncate_chars(body.trim(), FALLBACK_SNIPPET_CHARS);
        if snippet.is_empty() {
            bullets.push(format!("- {}", title));
        } else {
            bullets.push(format!("- {}: {}", title, snippet));
        }
    }

    format!(
        "Here is what the most relevant documents say:\n\n{}\n\n\
         (Generated summary unavailable — this is extracted directly from the \
         sources above. Try narrowing your question for a more specific answer.)",
        bullets.join("\n")
    )
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    #[test]
    fn test_fallback_never_empty_for_nonempty_context() {
        let contexts = [
            "# [1] Doc\nBody text.",
            "x",
            "# [1] A\naaa\n\n---\n\n# [2] B\nbbb",
        ];
        for ctx in contexts {
            assert!(!extractive_fallback(ctx).trim().is_empty());
        }
    }

    #[test]
    fn test_fallback_on_empty_context_is_no_match_answer() {
        assert_eq!(extractive_fallback(""), NO_MATCH_ANSWER);
        assert_eq!(extractive_fallback("   \n  "), NO_MATCH_ANSWER);
    }

    #[test]
    fn test_fallback_extracts_titles_and_snippets() {
        let ctx = "# [1] Refund Policy\nRefunds are processed within 5 business days.\
                   \n\n---\n\n# [2] Shipping FAQ\nOrders ship within 48 hours.";
        let answer = extractive_fallback(ctx);
        assert!(answer.contains("[1] Refund Policy"));
        assert!(answer.contains("Refunds are processed"));
        assert!(answer.contains("[2] Shipping FAQ"));
        assert!(answer.contains("narrowing your question"));
    }

    #[test]
    fn test_fallback_limits_block_count() {
        let blocks: Vec<String> = (1..=6)
            .map(|i| format!("# [{}] Doc{}\nbody {}", i, i, i))
            .collect();
        let ctx = blocks.join("\n\n---\n\n");
        let answer = extractive_fallback(&ctx);
        assert!(answer.contains("Doc1"));
        assert!(answer.contains("Doc3"));
        assert!(!answer.contains("Doc4"));
    }

    #[test]
    fn test_fallback_truncates_long_bodies() {
        let ctx = format!("# [1] Long\n{}", "z".repeat(2000));
        let answer = extractive_fallback(&ctx);
        assert!(answer.chars().count() < 1000);
    }

    #[test]
    fn test_truncate_chars_multibyte_safe() {
        let s = "héllo wörld";
        assert_eq!(truncate_chars(s, 5), "héllo");
        assert_eq!(truncate_chars(s, 100), s);
    }

    #[tokio::test]
    async fn test_disabled_provider_goes_straight_to_fallback() {
        let config = GenerationConfig::default();
        assert_eq!(config.provider, "disabled");
        let answer = compose_answer(&config, "what?", "# [1] Doc\nSome content.").await;
        assert!(answer.contains("Some content."));
    }

    #[tokio::test]
    async fn test_unreachable_backend_falls_back() {
        let config = GenerationConfig {
            provider: "openai".to_string(),
            model: Some("gpt-4o-mini".to_string()),
            base_url: Some("http://127.0.0.1:1".to_string()),
            timeout_secs: 1,
            ..GenerationConfig::default()
        };
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let answer = compose_answer(&config, "what?", "# [1] Doc\nFallback content.").await;
        assert!(answer.contains("Fallback content."));
    }
}
