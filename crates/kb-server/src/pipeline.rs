//! Blocking knowledge pipelines run behind the streaming bridge.
//!
//! Each pipeline owns its `RetrievalSession` and drives the async retriever
//! through a runtime handle captured on the caller's side. Progress is
//! reported between retrieval calls, never from inside `block_on`.

use tokio::runtime::Handle;
use tracing::{info, warn};

use kb_core::{KbError, Result, SearchMethod};
use kb_query::{KnowledgeContext, KnowledgeDigest, QueryConfig, RetrievalSession};
use kb_stream::Emitter;

/// Queries used when a synthesis request names none.
pub fn fallback_queries(subject: &str) -> Vec<String> {
    vec![
        subject.to_string(),
        format!("{} concepts fondamentaux", subject),
        format!("{} principes", subject),
        format!("{} applications pratiques", subject),
        format!("{} techniques avancées", subject),
    ]
}

fn degraded_notice(lost: SearchMethod) -> String {
    let kept = match lost {
        SearchMethod::Lexical => SearchMethod::Vector,
        SearchMethod::Vector => SearchMethod::Lexical,
    };
    format!("{} search unavailable, using {} results only", lost, kept)
}

/// Gather knowledge for one question.
pub fn retrieval_pipeline(
    mut session: RetrievalSession,
    handle: Handle,
    query: String,
    config: QueryConfig,
) -> impl FnOnce(&Emitter) -> Result<KnowledgeContext> + Send + 'static {
    move |emitter: &Emitter| {
        let normalized = session.retriever().normalizer().normalize(&query);
        emitter.progress(format!("Normalized query: {}", normalized));
        emitter.progress("Searching lexical and vector indexes...");

        let context = handle.block_on(session.gather_with(&query, &config))?;

        if let Some(lost) = context.degraded {
            emitter.progress(degraded_notice(lost));
        }
        emitter.progress(format!(
            "Found {} passages from {} sources",
            context.entries.len(),
            context.sources.len()
        ));
        Ok(context)
    }
}

/// Gather knowledge for a subject across several queries in one session.
///
/// A failing query is reported and skipped; the pipeline fails only when
/// every query failed.
pub fn synthesis_pipeline(
    mut session: RetrievalSession,
    handle: Handle,
    subject: String,
    queries: Vec<String>,
    config: QueryConfig,
) -> impl FnOnce(&Emitter) -> Result<KnowledgeDigest> + Send + 'static {
    move |emitter: &Emitter| {
        let queries = if queries.is_empty() {
            fallback_queries(&subject)
        } else {
            queries
        };
        let total = queries.len();
        info!("Synthesizing {:?} over {} queries", subject, total);

        let mut sections = Vec::with_capacity(total);
        let mut last_error = None;
        for (i, query) in queries.iter().enumerate() {
            if emitter.is_cancelled() {
                info!("Synthesis cancelled after {}/{} queries", i, total);
                return Err(KbError::bridge_worker("stream cancelled by consumer"));
            }

            emitter.progress(format!("Query {}/{}: {}", i + 1, total, query));
            match handle.block_on(session.gather_with(query, &config)) {
                Ok(context) => {
                    if let Some(lost) = context.degraded {
                        emitter.progress(degraded_notice(lost));
                    }
                    emitter.progress(format!(
                        "Query {}/{}: {} sources",
                        i + 1,
                        total,
                        context.sources.len()
                    ));
                    sections.push(context);
                }
                Err(e) => {
                    warn!("Synthesis query {:?} failed: {}", query, e);
                    emitter.progress(format!("Query {}/{} failed: {}", i + 1, total, e));
                    last_error = Some(e);
                }
            }
        }

        if sections.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        emitter.progress(format!(
            "Collected {} unique sources",
            session.sources().len()
        ));
        Ok(session.digest(&subject, sections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_queries() {
        let queries = fallback_queries("Isolation");
        assert_eq!(queries.len(), 5);
        assert_eq!(queries[0], "Isolation");
        assert_eq!(queries[1], "Isolation concepts fondamentaux");
        assert_eq!(queries[4], "Isolation techniques avancées");
    }

    #[test]
    fn test_degraded_notice() {
        assert_eq!(
            degraded_notice(SearchMethod::Vector),
            "vector search unavailable, using lexical results only"
        );
    }
}
