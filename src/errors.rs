//! Pipeline error taxonomy.
//!
//! Every failure in the ingestion and query paths belongs to one of six
//! categories, which determine how it propagates:
//!
//! - [`PipelineError::Input`] — missing/invalid CLI or request arguments;
//!   reported to the caller, the operation aborts (HTTP 400).
//! - [`PipelineError::SourceFormat`] — unsupported or corrupt document;
//!   aborts that ingestion only.
//! - [`PipelineError::Embedding`] — backend unavailable or malformed vector;
//!   aborts the current batch/request. Never substituted with a zero vector.
//! - [`PipelineError::Retrieval`] — vector store query failure; surfaced as
//!   HTTP 500, no partial results returned.
//! - [`PipelineError::Generation`] — generative backend failure; recovered
//!   locally via the extractive fallback, never shown to the end user.
//! - [`PipelineError::Persistence`] — write failure; fatal for ingestion,
//!   logged-and-tolerated for the query record on the read path.
//!
//! Errors travel through `anyhow::Result`; the HTTP layer recovers the
//! category with `downcast_ref` to pick a status code.

/// Categorized pipeline failure.
#[derive(Debug)]
pub enum PipelineError {
    Input(String),
    SourceFormat(String),
    Embedding(String),
    Retrieval(String),
    Generation(String),
    Persistence(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Input(m) => write!(f, "invalid input: {}", m),
            PipelineError::SourceFormat(m) => write!(f, "unsupported or corrupt source: {}", m),
            PipelineError::Embedding(m) => write!(f, "embedding failed: {}", m),
            PipelineError::Retrieval(m) => write!(f, "retrieval failed: {}", m),
            PipelineError::Generation(m) => write!(f, "generation failed: {}", m),
            PipelineError::Persistence(m) => write!(f, "write failed: {}", m),
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    pub fn input(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(PipelineError::Input(msg.into()))
    }

    pub fn source_format(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(PipelineError::SourceFormat(msg.into()))
    }

    pub fn embedding(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(PipelineError::Embedding(msg.into()))
    }

    pub fn retrieval(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(PipelineError::Retrieval(msg.into()))
    }

    pub fn generation(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(PipelineError::Generation(msg.into()))
    }

    pub fn persistence(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(PipelineError::Persistence(msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_survives_anyhow_roundtrip() {
        let err = PipelineError::input("question must not be empty");
        let recovered = err.downcast_ref::<PipelineError>();
        assert!(matches!(recovered, Some(PipelineError::Input(_))));
    }

    #[test]
    fn display_includes_message() {
        let e = PipelineError::SourceFormat("bad pdf".to_string());
        assert!(e.to_string().contains("bad pdf"));
    }
}
