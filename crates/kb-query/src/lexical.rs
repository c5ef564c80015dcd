//! Lexical search adapter.

use std::sync::Arc;

use tracing::debug;

use kb_core::{CandidateHit, KbError, LexicalIndex, Result, SearchMethod};

/// Queries the keyword index with normalized text.
#[derive(Clone)]
pub struct LexicalSearch {
    index: Arc<dyn LexicalIndex>,
}

impl LexicalSearch {
    pub fn new(index: Arc<dyn LexicalIndex>) -> Self {
        Self { index }
    }

    /// Return up to `limit` hits in backend order.
    ///
    /// Every failure surfaces as `BackendUnavailable`; no retry happens here.
    pub async fn search(&self, normalized: &str, limit: usize) -> Result<Vec<CandidateHit>> {
        let hits = self.index.query(normalized, limit).await.map_err(|e| match e {
            KbError::BackendUnavailable { .. } => e,
            other => KbError::backend_unavailable("lexical", other.to_string()),
        })?;

        let hits: Vec<CandidateHit> = hits
            .into_iter()
            .take(limit)
            .map(|(id, score)| CandidateHit::new(id, score, SearchMethod::Lexical))
            .collect();

        debug!("Lexical search returned {} hits", hits.len());
        Ok(hits)
    }
}
