use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuizError {
    #[error("AI error: {0}")]
    Ai(#[from] AIError),
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("Query error: {0}")]
    Query(#[from] QueryResolverError),
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum QueryResolverError {
    #[error("AI error: {0}")]
    Ai(#[from] AIError),
    #[error("JSON deserialization error: {0}. Raw response: {1}")]
    JsonDeserialization(#[source] serde_json::Error, String),
    #[error("Response failed validation: {0}. Raw response: {1}")]
    Validation(String, String),
    #[error("Max retries exceeded after {attempts} attempts: {last}")]
    MaxRetriesExceeded { attempts: usize, last: String },
}

#[derive(Error, Debug)]
pub enum AIError {
    #[error("Gemini API error: {0}")]
    Gemini(#[from] GeminiError),
    #[error("Embedding provider returned no vector")]
    MissingEmbedding,
    #[error("Mock error: {0}")]
    Mock(String),
}

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limit exceeded")]
    RateLimit,
    #[error("Authentication failed")]
    Authentication,
}

impl AIError {
    /// Retry bucket this error is counted against in `RetryConfig`.
    pub fn retry_category(&self) -> &'static str {
        match self {
            AIError::Gemini(GeminiError::RateLimit) => "rate_limit",
            AIError::Gemini(GeminiError::Api(_)) => "api_error",
            AIError::Gemini(GeminiError::Http(_)) => "http_error",
            AIError::Gemini(GeminiError::Authentication) => "authentication",
            AIError::MissingEmbedding => "api_error",
            AIError::Mock(_) => "api_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("PDF not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to extract PDF text from {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },
    #[error("No text could be extracted from {0}")]
    EmptyText(PathBuf),
    #[error("Document produced no chunks")]
    NoChunks,
    #[error("Invalid chunking parameters: chunk_size={chunk_size}, overlap={overlap}")]
    InvalidChunking { chunk_size: usize, overlap: usize },
    #[error("Invalid document title pattern '{title}': {reason}")]
    InvalidTitle { title: String, reason: String },
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Invalid vector: {0}")]
    InvalidVector(String),
    #[error("Chunk count {chunks} does not match vector count {vectors}")]
    LengthMismatch { chunks: usize, vectors: usize },
    #[error("Cannot build an index from zero vectors")]
    Empty,
    #[error("Embedding batch returned {got} vectors for {expected} texts")]
    BatchSize { expected: usize, got: usize },
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("No questions could be generated from {attempted} topics")]
    NoQuestions { attempted: usize },
    #[error("No topics found to generate questions from")]
    NoTopics,
    #[error("Retrieval returned no usable context for '{0}'")]
    EmptyContext(String),
}
