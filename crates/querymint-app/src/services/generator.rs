//! Query generation adapter.
//!
//! `GenerationClient` owns request shaping (content truncation) and result
//! normalization. The network call itself sits behind `QueryProvider` so the
//! scheduler can run against a Gemini agent in production and a fake in tests.

use std::sync::Arc;

use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::gemini;
use serde_json::json;
use thiserror::Error;

use crate::constants::MAX_CONTENT_CHARS;
use crate::pipeline::hit::Hit;
use crate::pipeline::query_set::QuerySet;

pub(crate) const QUERY_SYSTEM_PROMPT: &str = "You write search queries that a user could type to find the given content. \
Reply with a single JSON object and nothing else. The object has exactly these keys, each an array of short strings: \
`keywords` (2-4 word keyword queries), `entities` (names of products, people, organisations or technologies mentioned), \
`concepts` (short conceptual phrases), `questions` (natural-language questions the content answers), \
`problems` (problem statements a reader might search for). Use an empty array when a category does not apply.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("missing GOOGLE_AI_API_KEY or GEMINI_API_KEY environment variable")]
    MissingApiKey,
    #[error("generation model key must not be empty")]
    InvalidModel,
    #[error("generation request for `{id}` failed: {message}")]
    Provider { id: String, message: String },
    #[error("generation response for `{id}` was unusable: {reason}")]
    InvalidResponse { id: String, reason: String },
}

impl GenerationError {
    /// Errors raised before any request was made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GenerationError::MissingApiKey | GenerationError::InvalidModel
        )
    }

    pub fn provider(id: impl Into<String>, message: impl Into<String>) -> Self {
        GenerationError::Provider {
            id: id.into(),
            message: message.into(),
        }
    }
}

/// What actually goes over the wire for one hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub id: String,
    pub display_name: String,
    pub content: String,
    pub truncated: bool,
}

impl GenerationRequest {
    pub fn from_hit(hit: &Hit) -> Self {
        let (content, truncated) = truncate_chars(&hit.content, MAX_CONTENT_CHARS);
        Self {
            id: hit.id.clone(),
            display_name: hit.display_name.clone(),
            content: content.to_string(),
            truncated,
        }
    }

    fn render(&self) -> String {
        format!(
            "Title: {}\nId: {}\n\nContent:\n{}",
            self.display_name, self.id, self.content
        )
    }
}

/// Cut `text` to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

#[async_trait]
pub trait QueryProvider: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> Result<QuerySet, GenerationError>;
}

#[async_trait]
impl<P> QueryProvider for Arc<P>
where
    P: QueryProvider + ?Sized,
{
    async fn complete(&self, request: &GenerationRequest) -> Result<QuerySet, GenerationError> {
        self.as_ref().complete(request).await
    }
}

/// Single-hit generation capability. Stateless between calls and never
/// retries.
#[derive(Clone)]
pub struct GenerationClient<P> {
    provider: P,
}

impl<P> GenerationClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> GenerationClient<P>
where
    P: QueryProvider,
{
    pub async fn generate(&self, hit: &Hit) -> Result<QuerySet, GenerationError> {
        let request = GenerationRequest::from_hit(hit);
        if request.truncated {
            tracing::debug!(
                id = %request.id,
                chars = MAX_CONTENT_CHARS,
                "truncated hit content before generation"
            );
        }
        let query_set = self.provider.complete(&request).await?;
        Ok(query_set.normalized())
    }
}

/// Gemini-backed provider built on a rig agent.
#[derive(Clone)]
pub struct GeminiQueryProvider {
    agent: Arc<Agent<gemini::completion::CompletionModel>>,
    model: String,
}

impl GeminiQueryProvider {
    pub fn from_env(model: impl Into<String>) -> Result<Self, GenerationError> {
        let api_key = std::env::var("GOOGLE_AI_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| GenerationError::MissingApiKey)?;
        Self::with_api_key(&api_key, model)
    }

    pub fn with_api_key(api_key: &str, model: impl Into<String>) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey);
        }
        let model = model.into();
        if model.trim().is_empty() {
            return Err(GenerationError::InvalidModel);
        }

        let client = gemini::Client::new(api_key);
        let agent = client
            .agent(&model)
            .preamble(QUERY_SYSTEM_PROMPT)
            .temperature(0.2)
            .additional_params(json!({
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "candidateCount": 1
                }
            }))
            .build();

        Ok(Self {
            agent: Arc::new(agent),
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl QueryProvider for GeminiQueryProvider {
    async fn complete(&self, request: &GenerationRequest) -> Result<QuerySet, GenerationError> {
        let reply = self
            .agent
            .prompt(request.render())
            .await
            .map_err(|err| GenerationError::provider(&request.id, err.to_string()))?;
        parse_query_set(&request.id, &reply)
    }
}

/// Parse a provider reply, tolerating a Markdown code fence around the JSON.
pub(crate) fn parse_query_set(id: &str, reply: &str) -> Result<QuerySet, GenerationError> {
    let body = strip_code_fence(reply);
    if body.is_empty() {
        return Err(GenerationError::InvalidResponse {
            id: id.to_string(),
            reason: "empty reply".to_string(),
        });
    }

    let query_set: QuerySet =
        serde_json::from_str(body).map_err(|err| GenerationError::InvalidResponse {
            id: id.to_string(),
            reason: format!("invalid JSON: {err}"),
        })?;
    let query_set = query_set.normalized();
    query_set
        .validate()
        .map_err(|err| GenerationError::InvalidResponse {
            id: id.to_string(),
            reason: err.to_string(),
        })?;
    Ok(query_set)
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the optional language tag on the opening fence line
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
