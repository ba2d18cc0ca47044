use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ChunkConfig;
use crate::error::{IngestError, QuizError};
use crate::ingest::Section;

/// Windows shorter than this (after trimming) are dropped.
pub const MIN_CHUNK_LENGTH: usize = 50;

/// A retrievable passage plus the metadata of the section it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub doc_name: Option<String>,
    pub section_number: String,
    pub section_title: String,
    pub page_range: String,
    pub chunk_index: usize,
    /// Character offsets into the section content
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

/// `(chunk_index, char_start, char_end, text)`
pub type TextWindow = (usize, usize, usize, String);

impl ChunkConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// Consecutive windows share `overlap` characters. Trimmed windows shorter
/// than `MIN_CHUNK_LENGTH` are skipped without consuming an index.
pub fn chunk_text(text: &str, config: ChunkConfig) -> Result<Vec<TextWindow>, IngestError> {
    config.validate()?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, including the end
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + config.chunk_size).min(len);
        let piece = text[bounds[start]..bounds[end]].trim();
        if piece.chars().count() >= MIN_CHUNK_LENGTH {
            windows.push((windows.len(), start, end, piece.to_string()));
        }
        if end == len {
            break;
        }
        start = end - config.overlap;
    }
    Ok(windows)
}

/// Chunk every section and attach its metadata.
pub fn sections_to_chunks(sections: &[Section], config: ChunkConfig) -> Result<Vec<Chunk>, IngestError> {
    let mut out = Vec::new();
    for section in sections {
        let title = if !section.section_title.is_empty() {
            section.section_title.clone()
        } else {
            section.doc_name.clone().unwrap_or_default()
        };

        let windows = chunk_text(&section.content, config)?;
        debug!(section = %section.section_number, windows = windows.len(), "Chunked section");
        out.extend(windows.into_iter().map(|(chunk_index, char_start, char_end, text)| Chunk {
            id: Uuid::new_v4().to_string(),
            doc_name: section.doc_name.clone(),
            section_number: section.section_number.clone(),
            section_title: title.clone(),
            page_range: format!("{}-{}", section.page_start, section.page_end),
            chunk_index,
            char_start,
            char_end,
            text,
        }));
    }
    info!(sections = sections.len(), chunks = out.len(), "Built chunks");
    Ok(out)
}

pub fn save_chunks_json(chunks: &[Chunk], path: &Path) -> Result<(), QuizError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(chunks)?)?;
    Ok(())
}

pub fn load_chunks_json(path: &Path) -> Result<Vec<Chunk>, QuizError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(chunk_size: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig { chunk_size, overlap }
    }

    #[test]
    fn windows_overlap_and_cover_the_text() {
        let text = "a".repeat(250);
        let windows = chunk_text(&text, cfg(100, 20)).unwrap();
        let spans: Vec<(usize, usize)> = windows.iter().map(|w| (w.1, w.2)).collect();
        assert_eq!(spans, vec![(0, 100), (80, 180), (160, 250)]);
        assert_eq!(windows.iter().map(|w| w.0).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn short_tail_is_dropped_without_consuming_an_index() {
        let text = format!("{}{}", "x".repeat(100), " ".repeat(30));
        let windows = chunk_text(&text, cfg(100, 40)).unwrap();
        // Second window trims down to 40 x's
        assert_eq!(windows.len(), 1);

        let text = format!("{}{}", " ".repeat(100), "y".repeat(100));
        let windows = chunk_text(&text, cfg(100, 0)).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!((windows[0].0, windows[0].1, windows[0].2), (0, 100, 200));
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let text = "ação ".repeat(40);
        let windows = chunk_text(&text, cfg(120, 20)).unwrap();
        assert_eq!(windows[0].2, 120);
        assert_eq!(windows[0].3.chars().count(), 119);
        assert_eq!(windows.last().unwrap().2, 200);
    }

    #[test]
    fn text_shorter_than_minimum_yields_nothing() {
        assert!(chunk_text("curto", cfg(900, 200)).unwrap().is_empty());
        assert!(chunk_text("", cfg(900, 200)).unwrap().is_empty());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(matches!(
            chunk_text("abc", cfg(10, 10)),
            Err(IngestError::InvalidChunking { .. })
        ));
        assert!(cfg(0, 0).validate().is_err());
    }

    #[test]
    fn chunks_inherit_section_metadata() {
        let sections = vec![Section {
            doc_name: Some("Regulamento Ponto Ton".into()),
            section_number: "4".into(),
            section_title: String::new(),
            page_start: 2,
            page_end: 3,
            content: "O pagamento será realizado em até trinta dias após a confirmação da venda.".into(),
        }];
        let chunks = sections_to_chunks(&sections, ChunkConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_title, "Regulamento Ponto Ton");
        assert_eq!(chunks[0].page_range, "2-3");
        assert_eq!(chunks[0].chunk_index, 0);
        assert!(Uuid::parse_str(&chunks[0].id).is_ok());
    }
}
