//! Generation bridge.
//!
//! Builds the context payload for a turn and forwards it to a text
//! generation service. The service sits behind the [`Generator`] trait so
//! tests can script it; [`ClaudeGenerator`] is the production backend.

mod context;
mod redact;

pub use context::{ContextLimits, Scene};
pub use redact::Redactor;
pub(crate) use redact::name_pattern;

use crate::session::Role;
use async_trait::async_trait;
use claude::Claude;
use thiserror::Error;

/// Why a generation request produced no usable text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generation service unreachable: {0}")]
    Network(String),

    #[error("generation service rejected the credentials: {0}")]
    Auth(String),

    #[error("generation quota exhausted: {0}")]
    Quota(String),

    #[error("malformed generation response: {0}")]
    Malformed(String),

    #[error("generation service unavailable: {0}")]
    Unavailable(String),
}

impl From<claude::Error> for GenerationError {
    fn from(e: claude::Error) -> Self {
        let detail = e.to_string();
        if e.is_auth() {
            return GenerationError::Auth(detail);
        }
        if e.is_quota() {
            return GenerationError::Quota(detail);
        }
        match e {
            claude::Error::Network(_) => GenerationError::Network(detail),
            claude::Error::Parse(_) => GenerationError::Malformed(detail),
            _ => GenerationError::Unavailable(detail),
        }
    }
}

/// What a request is for. Backends may use it to pick a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Narration,
    StatBlock,
}

/// One chat turn sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn player(text: impl Into<String>) -> Self {
        Self {
            role: Role::Player,
            text: text.into(),
        }
    }

    pub fn narrator(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// A fully built context payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub purpose: Purpose,
    pub system: String,
    pub turns: Vec<ChatTurn>,
}

impl GenerationRequest {
    /// The last player turn, if any.
    pub fn player_input(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Player)
            .map(|t| t.text.as_str())
    }
}

/// A text generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce text for the request. Never retried by callers.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Configuration for [`ClaudeGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Model override; the client default is used when unset.
    pub model: Option<String>,

    /// Maximum tokens for narration.
    pub max_tokens: usize,

    /// Maximum tokens for a single stat block.
    pub stat_block_max_tokens: usize,

    pub temperature: Option<f32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 600,
            stat_block_max_tokens: 400,
            temperature: Some(0.8),
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Generation backed by the Claude Messages API.
pub struct ClaudeGenerator {
    client: Claude,
    config: GeneratorConfig,
}

impl ClaudeGenerator {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            config: GeneratorConfig::default(),
        }
    }

    /// Build a generator from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, GenerationError> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn build_request(&self, request: GenerationRequest) -> claude::Request {
        // The API requires the conversation to open with a user turn.
        let messages: Vec<claude::Message> = request
            .turns
            .into_iter()
            .skip_while(|t| t.role != Role::Player)
            .filter_map(|t| match t.role {
                Role::Player => Some(claude::Message::user(t.text)),
                Role::Assistant => Some(claude::Message::assistant(t.text)),
                Role::System => None,
            })
            .collect();

        let max_tokens = match request.purpose {
            Purpose::Narration => self.config.max_tokens,
            Purpose::StatBlock => self.config.stat_block_max_tokens,
        };

        let mut api_request = claude::Request::new(messages)
            .with_system(request.system)
            .with_max_tokens(max_tokens);
        if let Some(ref model) = self.config.model {
            api_request = api_request.with_model(model.clone());
        }
        if let Some(temperature) = self.config.temperature {
            api_request = api_request.with_temperature(temperature);
        }
        api_request
    }
}

#[async_trait]
impl Generator for ClaudeGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let purpose = request.purpose;
        let api_request = self.build_request(request);
        if api_request.messages.is_empty() {
            return Err(GenerationError::Malformed(
                "request has no player turn".to_string(),
            ));
        }

        let response = self.client.complete(api_request).await.map_err(|e| {
            tracing::warn!(error = %e, ?purpose, "generation failed");
            GenerationError::from(e)
        })?;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(GenerationError::Malformed("empty response".to_string()));
        }
        tracing::debug!(
            ?purpose,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "generation complete"
        );
        Ok(text.to_string())
    }
}
