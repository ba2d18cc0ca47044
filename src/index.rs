//! Exact nearest-neighbour search over unit vectors.
//!
//! Vectors are L2-normalised before they are added, so the inner product
//! used for ranking is the cosine similarity.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::chunker::{load_chunks_json, save_chunks_json, Chunk};
use crate::error::{IndexError, QuizError};

pub const CHUNKS_FILE: &str = "chunks.json";
pub const INDEX_FILE: &str = "index.json";

/// Brute-force inner-product index. Ids are insertion positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, vectors: Vec::new() }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn check(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch { expected: self.dimension, got: vector.len() });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(IndexError::InvalidVector("vector contains non-finite values".to_string()));
        }
        Ok(())
    }

    /// Append a vector; returns its id.
    pub fn add(&mut self, vector: Vec<f32>) -> Result<usize, IndexError> {
        self.check(&vector)?;
        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    /// Top `k` ids by inner product, best first. Ties go to the lower id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(f32, usize)>, IndexError> {
        self.check(query)?;
        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, v)| (v.iter().zip(query).map(|(a, b)| a * b).sum::<f32>(), id))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Chunks and their vectors, kept in lockstep.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    chunks: Vec<Chunk>,
    index: FlatIndex,
}

impl KnowledgeBase {
    #[instrument(skip_all, fields(chunks = chunks.len(), vectors = vectors.len()))]
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch { chunks: chunks.len(), vectors: vectors.len() });
        }
        let dimension = vectors.first().map(Vec::len).ok_or(IndexError::Empty)?;

        let mut index = FlatIndex::new(dimension);
        for v in vectors {
            index.add(v)?;
        }
        info!(chunks = chunks.len(), dimension, "Built knowledge base");
        Ok(Self { chunks, index })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Write `chunks.json` and `index.json` into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), QuizError> {
        std::fs::create_dir_all(dir)?;
        save_chunks_json(&self.chunks, &dir.join(CHUNKS_FILE))?;
        std::fs::write(dir.join(INDEX_FILE), serde_json::to_string(&self.index)?)?;
        debug!(dir = %dir.display(), "Saved knowledge base");
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, QuizError> {
        let chunks = load_chunks_json(&dir.join(CHUNKS_FILE))?;
        let stored: FlatIndex = serde_json::from_str(&std::fs::read_to_string(dir.join(INDEX_FILE))?)?;
        let mut index = FlatIndex::new(stored.dimension);
        for vector in stored.vectors {
            index.add(vector)?;
        }
        if index.len() != chunks.len() {
            return Err(IndexError::LengthMismatch { chunks: chunks.len(), vectors: index.len() }.into());
        }
        info!(dir = %dir.display(), chunks = chunks.len(), "Loaded knowledge base");
        Ok(Self { chunks, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(n: usize) -> Chunk {
        Chunk {
            id: format!("c{}", n),
            doc_name: None,
            section_number: n.to_string(),
            section_title: format!("Seção {}", n),
            page_range: "1-1".into(),
            chunk_index: 0,
            char_start: 0,
            char_end: 10,
            text: format!("conteúdo {}", n),
        }
    }

    #[test]
    fn search_ranks_by_inner_product_with_stable_ties() {
        let mut index = FlatIndex::new(2);
        index.add(vec![1.0, 0.0]).unwrap();
        index.add(vec![0.0, 1.0]).unwrap();
        index.add(vec![1.0, 0.0]).unwrap();
        index.add(vec![0.6, 0.8]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.iter().map(|h| h.1).collect::<Vec<_>>(), vec![0, 2, 3]);
        assert!((hits[2].0 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        let mut index = FlatIndex::new(1);
        index.add(vec![1.0]).unwrap();
        assert_eq!(index.search(&[1.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn dimension_and_finiteness_are_checked() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(
            index.add(vec![1.0, 2.0]),
            Err(IndexError::DimensionMismatch { expected: 3, got: 2 })
        ));
        assert!(matches!(index.add(vec![f32::NAN, 0.0, 0.0]), Err(IndexError::InvalidVector(_))));
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn knowledge_base_requires_matching_lengths() {
        let err = KnowledgeBase::build(vec![chunk(0), chunk(1)], vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { chunks: 2, vectors: 1 }));
        assert!(matches!(KnowledgeBase::build(vec![], vec![]), Err(IndexError::Empty)));
    }

    #[test]
    fn save_and_load_preserve_contents() {
        let dir = std::env::temp_dir().join(format!("reg-quiz-kb-{}", uuid::Uuid::new_v4()));
        let kb = KnowledgeBase::build(vec![chunk(0), chunk(1)], vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        kb.save(&dir).unwrap();

        let loaded = KnowledgeBase::load(&dir).unwrap();
        assert_eq!(loaded.chunks(), kb.chunks());
        assert_eq!(loaded.index(), kb.index());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn load_rejects_a_tampered_index() {
        let dir = std::env::temp_dir().join(format!("reg-quiz-kb-{}", uuid::Uuid::new_v4()));
        let kb = KnowledgeBase::build(vec![chunk(0), chunk(1)], vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        kb.save(&dir).unwrap();

        std::fs::write(dir.join(INDEX_FILE), r#"{"dimension":2,"vectors":[[1.0,0.0],[1.0]]}"#).unwrap();
        assert!(matches!(
            KnowledgeBase::load(&dir),
            Err(QuizError::Index(IndexError::DimensionMismatch { expected: 2, got: 1 }))
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
