use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, ShortformError},
    provider::Provider,
};

pub const DEFAULT_FALLBACK_TITLE: &str = "You Won't Believe This Shocking Moment!";

/// Produces a short on-screen title from transcript text.
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleSettings {
    pub provider: Provider,
    /// Takes precedence over the provider's environment variable.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub fallback: String,
}

impl Default for TitleSettings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: None,
            max_tokens: 50,
            temperature: 1.0,
            fallback: DEFAULT_FALLBACK_TITLE.to_string(),
        }
    }
}

/// Title generation over an OpenAI-compatible chat-completions API.
pub struct ChatTitleGenerator {
    client: reqwest::Client,
    provider: Provider,
    api_key: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatTitleGenerator {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        let defaults = TitleSettings::default();
        Self {
            client: reqwest::Client::new(),
            provider,
            api_key: api_key.into(),
            endpoint: provider.config().api_url.to_string(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
        }
    }

    pub fn from_settings(settings: &TitleSettings, api_key: impl Into<String>) -> Self {
        Self::new(settings.provider, api_key)
            .with_limits(settings.max_tokens, settings.temperature)
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Send requests to another OpenAI-compatible server, e.g. a local proxy.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.provider.config().model,
            "messages": [
                {
                    "role": "user",
                    "content": title_prompt(prompt),
                },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

#[async_trait]
impl TitleGenerator for ChatTitleGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(prompt))
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ShortformError::TitleGenerationFailed {
                reason: format!("Invalid API response: {:?}", response),
            })?;

        clean_title(content).ok_or_else(|| ShortformError::TitleGenerationFailed {
            reason: format!("{} returned an empty title", self.provider.name()),
        })
    }
}

pub fn title_prompt(text: &str) -> String {
    format!("Generate a short, eye-catching clickbait title from: {}", text)
}

/// Trim whitespace and wrapping quotes; `None` if nothing is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let title = raw
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”'))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}
