//! Retrieval sessions and the knowledge they gather.
//!
//! A session numbers the sources it surfaces, starting at 1. The counter is
//! owned by the session value, so two sessions never share ids.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use kb_core::{Chunk, ChunkId, Result, ScoredChunk, SearchMethod, Source};

use crate::engine::{HybridRetriever, QueryConfig};

const UNTITLED: &str = "Untitled document";

/// Display URL for a chunk's source.
///
/// PDF links are rewritten to the file server download route when both a
/// file server and a content hash are known; otherwise the `.pdf` suffix is
/// dropped.
pub fn resolve_source_url(source_url: &str, hash: Option<&str>, fileserver_base: Option<&str>) -> String {
    let stem = source_url.len().checked_sub(4).and_then(|i| {
        source_url
            .get(i..)
            .filter(|ext| ext.eq_ignore_ascii_case(".pdf"))
            .and_then(|_| source_url.get(..i))
    });
    let Some(stem) = stem else {
        return source_url.to_string();
    };
    match (fileserver_base, hash) {
        (Some(base), Some(hash)) => format!("{}/download/{}", base.trim_end_matches('/'), hash),
        _ => stem.to_string(),
    }
}

/// One resolved chunk bound to its session source.
#[derive(Debug, Clone)]
pub struct KnowledgeEntry {
    pub source: Source,
    pub result: ScoredChunk,
}

impl KnowledgeEntry {
    /// Render as a `<knowledge>` block.
    pub fn render(&self) -> String {
        format!(
            "<knowledge id=\"{}\" title=\"{}\" url=\"{}\">\n{}\n</knowledge>",
            self.source.id, self.source.title, self.source.url, self.result.chunk.text
        )
    }
}

/// Knowledge gathered for one query.
#[derive(Debug, Clone)]
pub struct KnowledgeContext {
    pub query: String,
    pub entries: Vec<KnowledgeEntry>,

    /// Distinct sources of this context, in first-appearance order.
    pub sources: Vec<Source>,

    /// The signal lost to a backend failure, if any.
    pub degraded: Option<SearchMethod>,
}

impl KnowledgeContext {
    /// All knowledge blocks, separated by a blank line.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(KnowledgeEntry::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Knowledge gathered for a subject across several queries.
#[derive(Debug, Clone)]
pub struct KnowledgeDigest {
    pub subject: String,
    pub sections: Vec<KnowledgeContext>,

    /// Every source surfaced by the session, deduplicated.
    pub sources: Vec<Source>,
}

/// Per-pipeline retrieval state.
pub struct RetrievalSession {
    retriever: Arc<HybridRetriever>,
    fileserver_base: Option<String>,
    next_id: u32,
    by_chunk: HashMap<ChunkId, u32>,
    sources: Vec<Source>,
}

impl RetrievalSession {
    pub fn new(retriever: Arc<HybridRetriever>, fileserver_base: Option<String>) -> Self {
        Self {
            retriever,
            fileserver_base,
            next_id: 1,
            by_chunk: HashMap::new(),
            sources: Vec::new(),
        }
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    /// Sources surfaced so far, by id.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Run a retrieval and bind each result to a session source.
    pub async fn gather(&mut self, query: &str) -> Result<KnowledgeContext> {
        let config = self.retriever.config().clone();
        self.gather_with(query, &config).await
    }

    pub async fn gather_with(&mut self, query: &str, config: &QueryConfig) -> Result<KnowledgeContext> {
        let results = self.retriever.search_with(query, config).await?;

        let mut entries = Vec::with_capacity(results.results.len());
        let mut sources: Vec<Source> = Vec::new();
        for result in results.results {
            let source = self.source_for(&result.chunk);
            if !sources.iter().any(|s| s.id == source.id) {
                sources.push(source.clone());
            }
            entries.push(KnowledgeEntry { source, result });
        }

        debug!(
            "Gathered {} entries for {:?} ({} sources in session)",
            entries.len(),
            query,
            self.sources.len()
        );

        Ok(KnowledgeContext {
            query: results.query,
            entries,
            sources,
            degraded: results.degraded,
        })
    }

    /// Assemble a digest from contexts gathered in this session.
    pub fn digest(&self, subject: &str, sections: Vec<KnowledgeContext>) -> KnowledgeDigest {
        KnowledgeDigest {
            subject: subject.to_string(),
            sections,
            sources: self.sources.clone(),
        }
    }

    fn source_for(&mut self, chunk: &Chunk) -> Source {
        if let Some(&id) = self.by_chunk.get(&chunk.id) {
            if let Some(source) = self.sources.iter().find(|s| s.id == id) {
                return source.clone();
            }
        }

        let source = Source {
            id: self.next_id,
            title: chunk
                .metadata
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            url: resolve_source_url(
                &chunk.metadata.source_url,
                chunk.metadata.hash.as_deref(),
                self.fileserver_base.as_deref(),
            ),
        };
        self.next_id += 1;
        self.by_chunk.insert(chunk.id.clone(), source.id);
        self.sources.push(source.clone());
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_pdf_with_fileserver() {
        assert_eq!(
            resolve_source_url("https://x.org/Guide.PDF", Some("abc123"), Some("http://files:7700/")),
            "http://files:7700/download/abc123"
        );
    }

    #[test]
    fn test_resolve_pdf_without_hash_strips_suffix() {
        assert_eq!(
            resolve_source_url("https://x.org/guide.pdf", None, Some("http://files:7700")),
            "https://x.org/guide"
        );
        assert_eq!(
            resolve_source_url("https://x.org/guide.pdf", Some("abc"), None),
            "https://x.org/guide"
        );
    }

    #[test]
    fn test_resolve_non_pdf_unchanged() {
        assert_eq!(
            resolve_source_url("https://x.org/page", Some("abc"), Some("http://f")),
            "https://x.org/page"
        );
    }

    #[test]
    fn test_entry_render() {
        let entry = KnowledgeEntry {
            source: Source {
                id: 2,
                title: "Béton".to_string(),
                url: "https://x.org/b".to_string(),
            },
            result: ScoredChunk {
                rank: 1,
                fused_score: 0.01,
                chunk: Chunk::new("c", "Le béton armé."),
            },
        };
        assert_eq!(
            entry.render(),
            "<knowledge id=\"2\" title=\"Béton\" url=\"https://x.org/b\">\nLe béton armé.\n</knowledge>"
        );
    }
}
