//! Client abstractions and the resolver that turns raw model text into
//! validated, typed values.
//!
//! - `LowLevelClient` sends a prompt and returns raw text.
//! - `EmbeddingClient` turns texts into vectors.
//! - `QueryResolver` adds schema guidance, pulls the first matching JSON
//!   structure out of the reply, validates it, and retries per `RetryConfig`.

use crate::error::{AIError, QueryResolverError};
use crate::extract::extract_first;
use crate::interceptors::Interceptor;
use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Low-level model client abstraction.
///
/// Implementors provide `ask_raw`, which executes a prompt and returns the raw
/// model text. Parsing and validation happen in `QueryResolver`.
#[async_trait]
pub trait LowLevelClient: Send + Sync + Debug {
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError>;

    /// Clone this client into a boxed trait object
    fn clone_box(&self) -> Box<dyn LowLevelClient>;
}

impl Clone for Box<dyn LowLevelClient> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[async_trait]
impl LowLevelClient for Box<dyn LowLevelClient> {
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        self.as_ref().ask_raw(prompt).await
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        self.as_ref().clone_box()
    }
}

/// What a text is being embedded for. Providers that support asymmetric
/// retrieval embed documents and queries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    Document,
    Query,
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync + Debug {
    /// Embed every text, returning one vector per input in the same order.
    async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, AIError>;

    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>, AIError> {
        let mut vectors = self.embed_batch(&[text.to_string()], task).await?;
        vectors.pop().ok_or(AIError::MissingEmbedding)
    }

    fn clone_box(&self) -> Box<dyn EmbeddingClient>;
}

impl Clone for Box<dyn EmbeddingClient> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[async_trait]
impl EmbeddingClient for Box<dyn EmbeddingClient> {
    async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, AIError> {
        self.as_ref().embed_batch(texts, task).await
    }

    fn clone_box(&self) -> Box<dyn EmbeddingClient> {
        self.as_ref().clone_box()
    }
}

pub const JSON_PARSE_ERROR: &str = "json_parse_error";
pub const VALIDATION_ERROR: &str = "validation_error";

/// Retry budgets keyed by failure category (see `AIError::retry_category`).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: HashMap<String, usize>,
    pub default_max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let mut max_retries = HashMap::new();
        max_retries.insert("rate_limit".to_string(), 1);
        max_retries.insert("api_error".to_string(), 1);
        max_retries.insert("http_error".to_string(), 1);
        max_retries.insert("authentication".to_string(), 0);
        max_retries.insert(JSON_PARSE_ERROR.to_string(), 2);
        max_retries.insert(VALIDATION_ERROR.to_string(), 2);

        Self {
            max_retries,
            default_max_retries: 1,
        }
    }
}

impl RetryConfig {
    /// A config that never retries; useful for tests and dry runs.
    pub fn none() -> Self {
        Self {
            max_retries: HashMap::new(),
            default_max_retries: 0,
        }
    }

    pub fn budget(&self, category: &str) -> usize {
        self.max_retries
            .get(category)
            .copied()
            .unwrap_or(self.default_max_retries)
    }

    #[must_use]
    pub fn with_budget(mut self, category: &str, retries: usize) -> Self {
        self.max_retries.insert(category.to_string(), retries);
        self
    }
}

/// Query resolver that wraps a `LowLevelClient` and turns replies into
/// validated values.
#[derive(Clone)]
pub struct QueryResolver<C: LowLevelClient> {
    client: C,
    config: RetryConfig,
    interceptor: Option<Arc<dyn Interceptor>>,
}

impl<C: LowLevelClient> QueryResolver<C> {
    pub fn new(client: C, config: RetryConfig) -> Self {
        info!(default_max_retries = config.default_max_retries, "Creating new QueryResolver");
        Self { client, config, interceptor: None }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Record every prompt/response pair through `interceptor`
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Ask with schema guidance for `T`, extract the first `T`, and run it
    /// through `validate`. Malformed or invalid replies are retried.
    #[instrument(target = "reg_quiz::resolver", skip(self, prompt, validate), fields(prompt_len = prompt.len()))]
    pub async fn query_validated<T, U, F>(&self, prompt: String, validate: F) -> Result<U, QueryResolverError>
    where
        T: DeserializeOwned + JsonSchema,
        F: Fn(T) -> Result<U, String>,
    {
        let prompt = add_schema_guidance::<T>(prompt);
        let mut used: HashMap<&'static str, usize> = HashMap::new();
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            debug!(attempt = attempts, "Making API call");

            let (category, failure) = match self.ask(prompt.clone()).await {
                Err(ai_error) => {
                    let category = ai_error.retry_category();
                    warn!(error = %ai_error, attempt = attempts, category, "API call failed");
                    if self.exhausted(&mut used, category) {
                        error!(error = %ai_error, attempts, "Giving up on API call");
                        return Err(QueryResolverError::Ai(ai_error));
                    }
                    continue;
                }
                Ok(raw) => match extract_first::<T>(&raw) {
                    Err(e) => (JSON_PARSE_ERROR, QueryResolverError::JsonDeserialization(e, raw)),
                    Ok(value) => match validate(value) {
                        Ok(valid) => {
                            info!(attempts, "Query produced a valid response");
                            return Ok(valid);
                        }
                        Err(reason) => (VALIDATION_ERROR, QueryResolverError::Validation(reason, raw)),
                    },
                },
            };

            warn!(error = %failure, attempt = attempts, category, "Unusable model response");
            if self.exhausted(&mut used, category) {
                error!(attempts, category, "Max retries exceeded");
                return Err(QueryResolverError::MaxRetriesExceeded {
                    attempts,
                    last: failure.to_string(),
                });
            }
        }
    }

    async fn ask(&self, prompt: String) -> Result<String, AIError> {
        let response = self.client.ask_raw(prompt.clone()).await?;
        if let Some(interceptor) = &self.interceptor {
            if let Err(e) = interceptor.save(&prompt, &response).await {
                warn!(error = %e, "Interceptor failed to save exchange");
            }
        }
        Ok(response)
    }

    /// Count a failure against `category`; true once its budget is spent.
    fn exhausted(&self, used: &mut HashMap<&'static str, usize>, category: &'static str) -> bool {
        let count = used.entry(category).or_insert(0);
        *count += 1;
        *count > self.config.budget(category)
    }
}

/// Append JSON schema guidance for `T` to a prompt
pub fn add_schema_guidance<T>(prompt: String) -> String
where
    T: JsonSchema,
{
    let schema = schema_for!(T);
    let schema_json = serde_json::to_string_pretty(&schema)
        .unwrap_or_else(|_| "Schema serialization failed".to_string());

    format!(
        "{}\n\n## Response Format\nRespond with valid JSON matching this schema:\n```json\n{}\n```",
        prompt, schema_json
    )
}
