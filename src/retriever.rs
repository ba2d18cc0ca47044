use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::chunker::Chunk;
use crate::core::{EmbedTask, EmbeddingClient};
use crate::embeddings::normalize;
use crate::error::{IndexError, QuizError};
use crate::index::KnowledgeBase;

/// Leading characters compared when dropping duplicate passages.
const DEDUP_PREFIX: usize = 120;
const PART_SEPARATOR: &str = "\n\n---\n\n";
pub const QUERY_PREFIX: &str = "Create a question about: ";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub index: usize,
    pub score: f32,
    pub chunk: Chunk,
}

/// Embed `query` and return the `k` closest chunks.
#[instrument(skip(kb, embedder), fields(query_len = query.len()))]
pub async fn search_query<E>(kb: &KnowledgeBase, embedder: &E, query: &str, k: usize) -> Result<Vec<SearchHit>, QuizError>
where
    E: EmbeddingClient + ?Sized,
{
    let mut q = embedder.embed(query, EmbedTask::Query).await?;
    normalize(&mut q);

    let hits = kb
        .index()
        .search(&q, k)?
        .into_iter()
        .map(|(score, index)| {
            let chunk = kb.chunk(index).cloned().ok_or(IndexError::LengthMismatch {
                chunks: kb.len(),
                vectors: kb.index().len(),
            })?;
            Ok(SearchHit { index, score, chunk })
        })
        .collect::<Result<Vec<_>, IndexError>>()?;

    debug!(hits = hits.len(), best = ?hits.first().map(|h| h.score), "Search complete");
    Ok(hits)
}

fn source_header(hit: &SearchHit) -> String {
    let c = &hit.chunk;
    format!(
        "[Source: {} | Pages: {} | Title: {} | score:{:.3}]\n",
        c.doc_name.as_deref().unwrap_or("?"),
        c.page_range,
        if c.section_title.is_empty() { "?" } else { c.section_title.as_str() },
        hit.score
    )
}

/// Assemble a prompt context from search hits within `char_limit` characters.
///
/// Empty passages and passages sharing their first 120 characters with an
/// earlier one are skipped. A passage that does not fit is cut back to its
/// last full sentence when it has one.
pub fn build_context(hits: &[SearchHit], char_limit: usize, include_meta: bool) -> String {
    let mut seen = HashSet::new();
    let mut parts = String::new();
    let mut total = 0usize;

    for hit in hits {
        let text = hit.chunk.text.trim();
        if text.is_empty() {
            continue;
        }
        let key: String = text.chars().take(DEDUP_PREFIX).collect();
        if !seen.insert(key) {
            continue;
        }

        let header = if include_meta { source_header(hit) } else { String::new() };

        if total >= char_limit {
            break;
        }
        let remaining = char_limit - total;
        let max_for_this = 80usize.max(remaining.saturating_sub(50));

        let cut = if text.chars().count() > max_for_this {
            let head: String = text.chars().take(max_for_this).collect();
            match head.rfind('.') {
                Some(dot) => format!("{}.", head[..dot].trim()),
                None => head,
            }
        } else {
            text.to_string()
        };

        let part = format!("{}{}{}", header, cut, PART_SEPARATOR);
        total += part.chars().count();
        parts.push_str(&part);
    }

    parts.trim().to_string()
}

/// Up to `n` retrieval queries, one per distinct section title in order.
///
/// When there are fewer titles than `n`, chunks from untitled sections fill
/// the rest using an excerpt of their text as the topic.
pub fn build_queries(chunks: &[Chunk], n: usize) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    for title in chunks.iter().map(|c| c.section_title.trim()).filter(|t| !t.is_empty()) {
        if topics.len() >= n {
            break;
        }
        if !topics.iter().any(|t| t == title) {
            topics.push(title.to_string());
        }
    }

    let titled = topics.len();
    for chunk in chunks.iter().filter(|c| c.section_title.trim().is_empty()) {
        if topics.len() >= n {
            break;
        }
        let excerpt = excerpt(&chunk.text, DEDUP_PREFIX);
        if !excerpt.is_empty() && !topics.contains(&excerpt) {
            topics.push(excerpt);
        }
    }

    info!(titled, fallback = topics.len() - titled, "Built retrieval queries");
    topics.into_iter().map(|t| format!("{}{}", QUERY_PREFIX, t)).collect()
}

/// First `max_chars` characters of `text`, cut back to a word boundary.
fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    match head.rfind(char::is_whitespace) {
        Some(space) => head[..space].trim_end().to_string(),
        None => head,
    }
}
