use tracing::{debug, info, instrument};

use crate::chunker::Chunk;
use crate::core::{EmbedTask, EmbeddingClient};
use crate::error::{IndexError, IngestError, QuizError};

/// Keeps the normalisation finite for all-zero vectors.
pub const EPS: f32 = 1e-10;

/// Scale `v` to unit length in place.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in v.iter_mut() {
        *x /= norm + EPS;
    }
}

/// Embed every chunk in batches of `batch_size`, returning unit vectors in
/// chunk order.
#[instrument(skip_all, fields(chunks = chunks.len(), batch_size = batch_size))]
pub async fn embed_chunks<E>(embedder: &E, chunks: &[Chunk], batch_size: usize) -> Result<Vec<Vec<f32>>, QuizError>
where
    E: EmbeddingClient + ?Sized,
{
    if chunks.is_empty() {
        return Err(IngestError::NoChunks.into());
    }

    let mut vectors = Vec::with_capacity(chunks.len());
    for (batch_no, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed_batch(&texts, EmbedTask::Document).await?;
        if embedded.len() != texts.len() {
            return Err(IndexError::BatchSize { expected: texts.len(), got: embedded.len() }.into());
        }
        debug!(batch = batch_no, size = texts.len(), "Embedded batch");

        vectors.extend(embedded.into_iter().map(|mut v| {
            normalize(&mut v);
            v
        }));
    }

    info!(vectors = vectors.len(), dimension = vectors.first().map_or(0, Vec::len), "Embedded chunks");
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::MockEmbedder;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: "id".into(),
            doc_name: None,
            section_number: String::new(),
            section_title: String::new(),
            page_range: "1-1".into(),
            chunk_index: 0,
            char_start: 0,
            char_end: text.len(),
            text: text.into(),
        }
    }

    #[test]
    fn normalize_produces_unit_vectors_and_tolerates_zero() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        normalize(&mut zero);
        assert!(zero.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn embeds_across_batches_in_order() {
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk(&format!("texto numero {}", i))).collect();
        let embedder = MockEmbedder::new(16);
        let vectors = embed_chunks(&embedder, &chunks, 2).await.unwrap();

        assert_eq!(vectors.len(), 5);
        for (v, c) in vectors.iter().zip(&chunks) {
            let mut expected = embedder.vector_for(&c.text);
            normalize(&mut expected);
            assert_eq!(v, &expected);
        }
    }

    #[tokio::test]
    async fn empty_chunk_list_is_an_error() {
        let err = embed_chunks(&MockEmbedder::default(), &[], 50).await.unwrap_err();
        assert!(matches!(err, QuizError::Ingest(IngestError::NoChunks)));
    }
}
