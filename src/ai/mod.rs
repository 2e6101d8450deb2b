//! Plain-language narrative for analysis results
//!
//! The narrative explains scores that have already been computed; nothing
//! here feeds back into scoring. Only the JSON summary built in [`prompts`]
//! is sent to the model, never source code.
//!
//! # Environment Variables
//!
//! - `GROQ_API_KEY`: Required for the Groq backend (default)
//! - `OPENAI_API_KEY`: Required for the OpenAI backend
//! - `OLLAMA_MODEL`: Optional model override for a local Ollama server
//!
//! When no backend is usable the orchestrator renders
//! [`fallback_explanation`] instead.

mod client;
mod prompts;

pub use client::{LlmBackend, LlmClient, LlmConfig, Message, Role};
pub use prompts::{
    build_analysis_prompt, fallback_explanation, truncate_for_token_limit, MAX_PROMPT_CHARS,
    NARRATIVE_SYSTEM_PROMPT,
};

use thiserror::Error;

/// Errors from a narrative backend. Never surfaced to callers of an analysis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NarrativeServiceError {
    #[error("Narrative service not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Narrative request timed out after {0}s")]
    Timeout(u64),
}

/// Text generation backend. Blocking; callers bound it with their own timeout.
pub trait NarrativeService: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, NarrativeServiceError>;

    /// Short label for logs
    fn name(&self) -> &str {
        "narrative"
    }
}

/// Service used when narratives are switched off; always falls back
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNarrative;

impl NarrativeService for DisabledNarrative {
    fn generate(&self, _prompt: &str) -> Result<String, NarrativeServiceError> {
        Err(NarrativeServiceError::NotConfigured(
            "narrative generation disabled".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_narrative_never_generates() {
        let err = DisabledNarrative.generate("anything").unwrap_err();
        assert!(matches!(err, NarrativeServiceError::NotConfigured(_)));
    }
}
