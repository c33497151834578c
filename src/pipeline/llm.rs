//! Completion backends: the only stage code that touches the network.
//!
//! Stages talk to a [`CompletionBackend`] and never to an HTTP client or a
//! provider SDK directly. Two implementations ship with the crate:
//!
//! * [`OpenAiCompatBackend`]: `POST {base_url}/chat/completions` with a
//!   bearer key. Works with DeepSeek (the default), OpenAI, and any other
//!   endpoint that speaks the OpenAI chat format.
//! * [`ProviderBackend`]: wraps an `edgequake_llm` provider, used when the
//!   caller names a provider (`anthropic`, `gemini`, `ollama`, …).
//!
//! Calls are made exactly once. There is no retry: a failed call fails the
//! stage, and the orchestrator reports it together with the partial record.

use crate::config::LlmSettings;
use crate::error::ResumeError;
use crate::record::Stage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One prompt/response exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Stage issuing the call; used for logging and timeout errors.
    pub stage: Stage,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Overrides the backend's default model.
    pub model: Option<String>,
}

/// The model's answer plus token accounting (0 when the backend does not report usage).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Anything that can answer a [`CompletionRequest`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label for logs ("deepseek-chat @ api.deepseek.com", "anthropic", …).
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ResumeError>;
}

// ── OpenAI-compatible HTTP backend ───────────────────────────────────────

/// Backend for any endpoint that accepts the OpenAI chat completion format.
pub struct OpenAiCompatBackend {
    settings: LlmSettings,
    http: reqwest::Client,
    timeout: Duration,
    label: String,
}

impl OpenAiCompatBackend {
    pub fn new(settings: LlmSettings, timeout: Duration) -> Result<Self, ResumeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResumeError::Internal(format!("Failed to build HTTP client: {e}")))?;
        let label = format!("{} @ {}", settings.model, host_of(&settings.base_url));
        Ok(Self {
            settings,
            http,
            timeout,
            label,
        })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn completions_url(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessageBody<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessageBody<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ChoiceBody>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Debug, Deserialize)]
struct ChoiceBody {
    message: ResponseMessageBody,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessageBody {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ResumeError> {
        let model = request.model.as_deref().unwrap_or(&self.settings.model);
        let body = ChatRequestBody {
            model,
            messages: vec![
                ChatMessageBody {
                    role: "system",
                    content: &request.system,
                },
                ChatMessageBody {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            stage = %request.stage,
            model = %model,
            url = %self.completions_url(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResumeError::ApiTimeout {
                        stage: request.stage,
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    ResumeError::LlmApiError {
                        message: format!("request to {} failed: {e}", self.completions_url()),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = extract_error_message(&text).unwrap_or(text);
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ResumeError::AuthError {
                    provider: host_of(&self.settings.base_url),
                    detail,
                });
            }
            return Err(ResumeError::LlmApiError {
                message: format!("HTTP {status}: {detail}"),
            });
        }

        let parsed: ChatResponseBody = response.json().await.map_err(|e| {
            ResumeError::LlmApiError {
                message: format!("failed to parse response: {e}"),
            }
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ResumeError::LlmApiError {
                message: "response contained no choices".to_string(),
            })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ResumeError::LlmApiError {
                message: "response was blocked by the provider's content filter".to_string(),
            });
        }

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            input_tokens,
            output_tokens,
        })
    }
}

/// Pull `error.message` (or a top-level `message`) out of an error body.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

// ── edgequake-llm provider backend ───────────────────────────────────────

/// Backend over an `edgequake_llm` provider.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Instantiate a named provider; the factory reads that provider's API
    /// key variable (`ANTHROPIC_API_KEY`, `GEMINI_API_KEY`, …).
    pub fn from_factory(provider_name: &str, model: &str) -> Result<Self, ResumeError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            ResumeError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, format!("{provider_name}/{model}")))
    }
}

#[async_trait]
impl CompletionBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ResumeError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.user.as_str()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ResumeError::LlmApiError {
                message: format!("{e}"),
            })?;

        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}
