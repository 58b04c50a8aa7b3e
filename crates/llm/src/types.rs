//! Provider and generation option types.

use serde::{Deserialize, Serialize};

/// Sampling options shared by every generation request of a knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier
    pub model: String,

    /// Sampling temperature; answers over guidelines default to deterministic output
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens", rename = "maxTokens")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> Option<f32> {
    Some(0.0)
}

fn default_max_tokens() -> Option<u32> {
    Some(1000)
}

impl GenerationOptions {
    /// Options for a model with the default sampling settings.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Ollama,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
        }
    }

    /// Default API base URL.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!(ProviderType::parse("openai"), Some(ProviderType::OpenAI));
        assert_eq!(ProviderType::parse("OLLAMA"), Some(ProviderType::Ollama));
        assert_eq!(ProviderType::parse("claude"), None);
    }

    #[test]
    fn test_generation_defaults_from_yaml() {
        let options: GenerationOptions = serde_json::from_str(r#"{"model":"llama3.2"}"#).unwrap();
        assert_eq!(options.temperature, Some(0.0));
        assert_eq!(options.max_tokens, Some(1000));
        assert_eq!(options, GenerationOptions::for_model("llama3.2"));
    }
}
