//! OpenAI-compatible chat completion client
//!
//! Groq, OpenAI and a local Ollama server all speak the same API, so one
//! request shape covers every backend. Uses ureq (sync HTTP); the
//! orchestrator calls it from the blocking pool.

use super::{NarrativeService, NarrativeServiceError, NARRATIVE_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Supported LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Groq,
    OpenAi,
    Ollama,
}

impl LlmBackend {
    pub fn env_key(&self) -> &'static str {
        match self {
            LlmBackend::Groq => "GROQ_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
            LlmBackend::Ollama => "OLLAMA_MODEL",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::Groq => "llama-3.1-8b-instant",
            LlmBackend::OpenAi => "gpt-4o-mini",
            LlmBackend::Ollama => "llama3.1:8b",
        }
    }

    pub fn api_url(&self) -> &'static str {
        match self {
            LlmBackend::Groq => "https://api.groq.com/openai/v1/chat/completions",
            LlmBackend::OpenAi => "https://api.openai.com/v1/chat/completions",
            LlmBackend::Ollama => "http://localhost:11434/v1/chat/completions",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LlmBackend::Ollama)
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmBackend::Groq => write!(f, "groq"),
            LlmBackend::OpenAi => write!(f, "openai"),
            LlmBackend::Ollama => write!(f, "ollama"),
        }
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(LlmBackend::Groq),
            "openai" => Ok(LlmBackend::OpenAi),
            "ollama" => Ok(LlmBackend::Ollama),
            other => Err(format!("unknown LLM backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            model: None,
            max_tokens: 600,
            temperature: 0.2,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }
}

/// Chat completion client
pub struct LlmClient {
    config: LlmConfig,
    api_key: String,
    agent: ureq::Agent,
}

fn make_agent(timeout: Duration) -> ureq::Agent {
    ureq::config::Config::builder()
        .http_status_as_error(false) // status codes are mapped below
        .timeout_global(Some(timeout))
        .build()
        .new_agent()
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Self {
        let agent = make_agent(Duration::from_secs(config.timeout_secs.max(1)));
        Self {
            config,
            api_key: api_key.into(),
            agent,
        }
    }

    pub fn from_env(config: LlmConfig) -> Result<Self, NarrativeServiceError> {
        Self::from_key(config, None)
    }

    /// Build a client, preferring `api_key` over the backend's env var.
    pub fn from_key(
        mut config: LlmConfig,
        api_key: Option<String>,
    ) -> Result<Self, NarrativeServiceError> {
        if !config.backend.requires_api_key() {
            if config.model.is_none() {
                if let Ok(model) = env::var("OLLAMA_MODEL") {
                    config.model = Some(model);
                }
            }
            return Ok(Self::new(config, "ollama"));
        }

        let env_key = config.backend.env_key();
        let api_key = api_key
            .or_else(|| env::var(env_key).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| NarrativeServiceError::NotConfigured(format!("{} not set", env_key)))?;

        Ok(Self::new(config, api_key))
    }

    pub fn backend(&self) -> LlmBackend {
        self.config.backend
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    fn chat(&self, messages: Vec<Message>) -> Result<String, NarrativeServiceError> {
        let body = ChatRequest {
            model: self.config.model().to_string(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut req = self
            .agent
            .post(self.config.backend.api_url())
            .header("Content-Type", "application/json");

        if self.config.backend.requires_api_key() {
            req = req.header("Authorization", &format!("Bearer {}", self.api_key));
        }

        let response = req.send_json(&body).map_err(|e| match e {
            ureq::Error::Timeout(_) => NarrativeServiceError::Timeout(self.config.timeout_secs),
            other => NarrativeServiceError::Transport(other.to_string()),
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let error_text = response.into_body().read_to_string().unwrap_or_default();
            return Err(NarrativeServiceError::Http {
                status,
                message: api_error_message(&error_text),
            });
        }

        let resp: ChatResponse = response
            .into_body()
            .read_json()
            .map_err(|e| NarrativeServiceError::Parse(e.to_string()))?;

        if let Some(usage) = &resp.usage {
            debug!("{} used {} tokens", self.model(), usage.total_tokens);
        }

        resp.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| NarrativeServiceError::Parse("No response choices".to_string()))
    }
}

impl NarrativeService for LlmClient {
    fn generate(&self, prompt: &str) -> Result<String, NarrativeServiceError> {
        self.chat(vec![
            Message::system(NARRATIVE_SYSTEM_PROMPT),
            Message::user(prompt),
        ])
    }

    fn name(&self) -> &str {
        self.model()
    }
}

/// Pull `error.message` out of an API error body, falling back to the raw body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_defaults() {
        assert_eq!(LlmBackend::default(), LlmBackend::Groq);
        assert_eq!(LlmBackend::Groq.default_model(), "llama-3.1-8b-instant");
        assert!(!LlmBackend::Ollama.requires_api_key());
    }

    #[test]
    fn test_config_model() {
        let config = LlmConfig::default();
        assert_eq!(config.model(), "llama-3.1-8b-instant");
        assert_eq!(config.max_tokens, 600);

        let config = LlmConfig {
            model: Some("custom-model".to_string()),
            ..Default::default()
        };
        assert_eq!(config.model(), "custom-model");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("OpenAI".parse::<LlmBackend>(), Ok(LlmBackend::OpenAi));
        assert!("anthropic".parse::<LlmBackend>().is_err());
    }

    #[test]
    fn test_explicit_key_wins() {
        let client = LlmClient::from_key(LlmConfig::default(), Some("gsk_test".into()))
            .expect("should build with explicit key");
        assert_eq!(client.backend(), LlmBackend::Groq);
    }

    #[test]
    fn test_blank_key_not_configured() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            ..Default::default()
        };
        let err = LlmClient::from_key(config, Some("   ".into()));
        // a real OPENAI_API_KEY in the environment would satisfy this
        if env::var("OPENAI_API_KEY").map(|k| k.trim().is_empty()).unwrap_or(true) {
            assert!(matches!(err, Err(NarrativeServiceError::NotConfigured(_))));
        }
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#;
        assert_eq!(api_error_message(body), "Invalid API Key");
        assert_eq!(api_error_message("bad gateway\n"), "bad gateway");
    }
}
