use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent},
    terminal,
};
use tracing::warn;

use crate::error::{AIError, GeminiError};

/// Trait for types that can retrieve their configuration key from environment variables
pub trait KeyFromEnv {
    /// The environment variable name for this client's API key
    const KEY_NAME: &'static str;

    /// How long to wait for the user to type a key before giving up
    const PROMPT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Find the API key by checking environment variables, loading .env first
    fn find_key() -> Option<String> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();

        env::var(Self::KEY_NAME).ok().filter(|k| !k.trim().is_empty())
    }

    /// Find the API key, falling back to asking the user on the terminal
    fn find_key_with_user() -> Result<String, AIError> {
        if let Some(key) = Self::find_key() {
            return Ok(key);
        }

        print!(
            "Environment variable {} not found. Please enter the API key ({} second timeout): ",
            Self::KEY_NAME,
            Self::PROMPT_TIMEOUT.as_secs()
        );
        let _ = io::stdout().flush();

        let (sender, receiver) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let mut input = String::new();
            if io::stdin().read_line(&mut input).is_ok() {
                let _ = sender.send(input.trim().to_string());
            }
        });

        let api_key = match receiver.recv_timeout(Self::PROMPT_TIMEOUT) {
            Ok(input) if !input.is_empty() => input,
            _ => return Err(AIError::Gemini(GeminiError::Authentication)),
        };

        if Self::prompt_save_to_env() {
            if let Err(e) = Self::save_to_env_file(&api_key) {
                warn!(error = %e, "Failed to save API key to .env file");
            } else {
                println!("API key saved to .env file");
            }
        }

        Ok(api_key)
    }

    /// Ask whether the key should be written to .env.
    /// Single keystroke when the terminal allows it, line input otherwise.
    fn prompt_save_to_env() -> bool {
        print!("Add {} to .env file? (y/N): ", Self::KEY_NAME);
        let _ = io::stdout().flush();

        if let Ok(response) = Self::read_single_key() {
            println!("{}", response);
            return response == "y";
        }

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_ok() {
            input.trim().eq_ignore_ascii_case("y")
        } else {
            false
        }
    }

    fn read_single_key() -> io::Result<String> {
        terminal::enable_raw_mode()?;

        let result = if event::poll(Duration::from_secs(30)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(KeyEvent { code: KeyCode::Char('y' | 'Y'), .. })) => "y",
                _ => "n",
            }
        } else {
            "n"
        };

        terminal::disable_raw_mode()?;
        Ok(result.to_string())
    }

    /// Append the key to .env unless it is already there
    fn save_to_env_file(api_key: &str) -> io::Result<()> {
        if let Ok(content) = std::fs::read_to_string(".env") {
            if content.contains(&format!("{}=", Self::KEY_NAME)) {
                return Ok(());
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(".env")?;
        file.write_all(format!("{}={}\n", Self::KEY_NAME, api_key).as_bytes())
    }
}

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Configuration for the Gemini client
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.4,
            max_output_tokens: 2048,
        }
    }
}

impl GeminiConfig {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self { api_key, ..Default::default() }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Regulations the section detector knows how to recognise by default.
pub const DEFAULT_DOCUMENT_TITLES: &[&str] = &[
    "Regulamento Campanha ChaveTON",
    "Regulamento Ponto Ton",
    "Regulamento Ton na Mão",
    "Regulamento Pronta Entrega",
    "Regulamento Indique TapTon",
    "Regulamento Renda Ton",
    "Regulamento Renda Extra",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self { chunk_size: 900, overlap: 200 }
    }
}

/// Knobs for every pipeline stage after text extraction
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkConfig,
    pub embed_batch_size: usize,
    pub top_k: usize,
    pub context_char_limit: usize,
    pub include_source_headers: bool,
    pub question_count: usize,
    pub document_titles: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            embed_batch_size: 50,
            top_k: 5,
            context_char_limit: 3000,
            include_source_headers: true,
            question_count: 10,
            document_titles: DEFAULT_DOCUMENT_TITLES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub const fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub const fn with_question_count(mut self, question_count: usize) -> Self {
        self.question_count = question_count;
        self
    }

    #[must_use]
    pub fn with_document_titles(mut self, titles: Vec<String>) -> Self {
        self.document_titles = titles;
        self
    }
}
