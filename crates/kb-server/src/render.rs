//! Markdown bodies delivered as completion content.

use kb_core::Source;
use kb_query::{KnowledgeContext, KnowledgeDigest, KnowledgeEntry};

/// A pipeline result that can be delivered as completion text.
pub trait CompletionBody {
    fn completion_body(&self) -> String;
}

/// `**Sources:**` list, one `N. [title](url)` line per source.
pub fn sources_markdown(sources: &[Source]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\n**Sources:**\n");
    for source in sources {
        out.push_str(&format!("{}. [{}]({})\n", source.id, source.title, source.url));
    }
    out
}

fn passages(entries: &[KnowledgeEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("[{}] {}", entry.source.id, entry.result.chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl CompletionBody for KnowledgeContext {
    fn completion_body(&self) -> String {
        if self.is_empty() {
            return format!("No relevant knowledge found for \"{}\".", self.query);
        }
        format!("{}{}", passages(&self.entries), sources_markdown(&self.sources))
    }
}

impl CompletionBody for KnowledgeDigest {
    fn completion_body(&self) -> String {
        let mut out = format!("# {}", self.subject);
        for section in &self.sections {
            out.push_str(&format!("\n\n## {}", section.query));
            if !section.is_empty() {
                out.push_str("\n\n");
                out.push_str(&passages(&section.entries));
            }
        }
        out.push_str(&sources_markdown(&self.sources));
        out
    }
}
