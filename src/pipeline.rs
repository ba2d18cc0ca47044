//! End-to-end flow: document -> chunks -> knowledge base -> questions.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::chunker::{sections_to_chunks, Chunk};
use crate::config::PipelineConfig;
use crate::core::{EmbeddingClient, LowLevelClient, QueryResolver};
use crate::embeddings::embed_chunks;
use crate::error::{GenerationError, IngestError, QuizError};
use crate::index::KnowledgeBase;
use crate::ingest::extract_sections;
use crate::mcq::{generate_mcq, Question};
use crate::retriever::{build_context, build_queries, search_query, SearchHit, QUERY_PREFIX};

/// Read `path` and split it into chunks.
#[instrument(skip(path, config), fields(path = %path.display()))]
pub fn ingest(path: &Path, config: &PipelineConfig) -> Result<Vec<Chunk>, QuizError> {
    let sections = extract_sections(path, &config.document_titles)?;
    let chunks = sections_to_chunks(&sections, config.chunking)?;
    if chunks.is_empty() {
        return Err(IngestError::NoChunks.into());
    }
    info!(sections = sections.len(), chunks = chunks.len(), "Ingested document");
    Ok(chunks)
}

pub async fn build_knowledge_base<E>(
    chunks: Vec<Chunk>,
    embedder: &E,
    config: &PipelineConfig,
) -> Result<KnowledgeBase, QuizError>
where
    E: EmbeddingClient + ?Sized,
{
    let vectors = embed_chunks(embedder, &chunks, config.embed_batch_size).await?;
    Ok(KnowledgeBase::build(chunks, vectors)?)
}

fn sources(hits: &[SearchHit]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for hit in hits {
        let source = format!(
            "{} (pages {})",
            hit.chunk.doc_name.as_deref().unwrap_or("document"),
            hit.chunk.page_range
        );
        if !out.contains(&source) {
            out.push(source);
        }
    }
    out
}

/// Retrieve context for one query and generate a question from it.
pub async fn generate_question<C, E>(
    kb: &KnowledgeBase,
    resolver: &QueryResolver<C>,
    embedder: &E,
    query: &str,
    config: &PipelineConfig,
) -> Result<Question, QuizError>
where
    C: LowLevelClient,
    E: EmbeddingClient + ?Sized,
{
    let topic = query.strip_prefix(QUERY_PREFIX).unwrap_or(query);
    let hits = search_query(kb, embedder, query, config.top_k).await?;
    let context = build_context(&hits, config.context_char_limit, config.include_source_headers);
    if context.is_empty() {
        return Err(GenerationError::EmptyContext(topic.to_string()).into());
    }
    Ok(generate_mcq(resolver, &context, topic, sources(&hits)).await?)
}

/// Generate up to `config.question_count` questions. Topics whose
/// generation fails are logged and skipped.
#[instrument(skip_all, fields(chunks = kb.len(), wanted = config.question_count))]
pub async fn generate_questions<C, E>(
    kb: &KnowledgeBase,
    resolver: &QueryResolver<C>,
    embedder: &E,
    config: &PipelineConfig,
) -> Result<Vec<Question>, QuizError>
where
    C: LowLevelClient,
    E: EmbeddingClient + ?Sized,
{
    let queries = build_queries(kb.chunks(), config.question_count);
    if queries.is_empty() {
        return Err(GenerationError::NoTopics.into());
    }

    let mut questions = Vec::with_capacity(queries.len());
    for (i, query) in queries.iter().enumerate() {
        match generate_question(kb, resolver, embedder, query, config).await {
            Ok(q) => {
                info!(n = i + 1, total = queries.len(), topic = %q.topic, "Question generated");
                questions.push(q);
            }
            Err(e) => warn!(n = i + 1, query = %query, error = %e, "Skipping question"),
        }
    }

    if questions.is_empty() {
        return Err(GenerationError::NoQuestions { attempted: queries.len() }.into());
    }
    info!(generated = questions.len(), attempted = queries.len(), "Generation finished");
    Ok(questions)
}
