use crate::config::{GeminiConfig, KeyFromEnv};
use crate::core::{EmbedTask, EmbeddingClient, LowLevelClient};
use crate::error::{AIError, GeminiError};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

fn task_type(task: EmbedTask) -> &'static str {
    match task {
        EmbedTask::Document => "RETRIEVAL_DOCUMENT",
        EmbedTask::Query => "RETRIEVAL_QUERY",
    }
}

/// Client for the Google Generative Language API, covering both text
/// generation and embeddings.
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.config.model)
            .field("embedding_model", &self.config.embedding_model)
            .finish_non_exhaustive()
    }
}

impl KeyFromEnv for GeminiClient {
    const KEY_NAME: &'static str = "GEMINI_API_KEY";
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        info!(model = %config.model, embedding_model = %config.embedding_model, "Creating new Gemini client");
        Self { config, client: Client::new() }
    }

    /// Build a client with the key from the environment (or the user).
    pub fn from_env(config: GeminiConfig) -> Result<Self, AIError> {
        let api_key = Self::find_key_with_user()?;
        Ok(Self::new(GeminiConfig { api_key, ..config }))
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:{}", self.config.base_url.trim_end_matches('/'), model, method)
    }

    fn qualified_embedding_model(&self) -> String {
        let model = &self.config.embedding_model;
        if model.starts_with("models/") { model.clone() } else { format!("models/{}", model) }
    }

    async fn post<B: Serialize>(&self, url: String, body: &B) -> Result<Response, AIError> {
        debug!(%url, "Sending request to Gemini API");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request failed");
                GeminiError::Http(e.to_string())
            })?;

        let status = response.status();
        debug!(%status, "Received response from Gemini API");

        if status == 429 {
            warn!("Gemini API rate limit exceeded");
            return Err(GeminiError::RateLimit.into());
        }
        if status == 401 || status == 403 {
            error!("Gemini API authentication failed");
            return Err(GeminiError::Authentication.into());
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(%status, error = %error_text, "Gemini API error");
            return Err(GeminiError::Api(format!("{}: {}", status, error_text)).into());
        }
        Ok(response)
    }
}

#[async_trait]
impl LowLevelClient for GeminiClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len(), model = %self.config.model))]
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
                response_mime_type: "application/json",
            },
        };

        let response = self.post(self.model_url(&self.config.model, "generateContent"), &request).await?;
        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini response JSON");
            GeminiError::Http(e.to_string())
        })?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            error!(%reason, "Prompt was blocked");
            return Err(GeminiError::Api(format!("prompt blocked: {}", reason)).into());
        }

        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            error!("No candidates in Gemini response");
            GeminiError::Api("No candidates in response".to_string())
        })?;

        let text: String = candidate.content.parts.into_iter().map(|p| p.text).collect();
        if text.trim().is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
            return Err(GeminiError::Api(format!("empty candidate (finish reason: {})", reason)).into());
        }

        info!(response_len = text.len(), "Successfully received Gemini response");
        Ok(text)
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl EmbeddingClient for GeminiClient {
    #[instrument(skip(self, texts), fields(batch = texts.len(), model = %self.config.embedding_model))]
    async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, AIError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.qualified_embedding_model();
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| EmbedRequest {
                    model: model.clone(),
                    content: Content { role: None, parts: vec![Part { text: t.clone() }] },
                    task_type: task_type(task),
                })
                .collect(),
        };

        let response = self
            .post(self.model_url(&self.config.embedding_model, "batchEmbedContents"), &request)
            .await?;
        let parsed: BatchEmbedResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse embedding response JSON");
            GeminiError::Http(e.to_string())
        })?;

        debug!(vectors = parsed.embeddings.len(), "Parsed embedding response");
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn clone_box(&self) -> Box<dyn EmbeddingClient> {
        Box::new(self.clone())
    }
}
