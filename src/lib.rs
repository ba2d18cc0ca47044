pub mod chunker;
pub mod clients;
pub mod config;
pub mod core;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod interceptors;
pub mod mcq;
pub mod pipeline;
pub mod quiz;
pub mod retriever;

// Convenient re-exports
pub use error::QuizError;
pub use extract::extract_first;
pub use index::KnowledgeBase;
pub use mcq::Question;
pub use quiz::{QuizReport, QuizSession};
