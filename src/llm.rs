//! Completion providers for the chat assistant.
//!
//! - [`AnthropicProvider`] calls the Anthropic Messages API
//!   (`POST {base}/v1/messages`).
//! - [`OpenAIChatProvider`] calls OpenAI chat completions
//!   (`POST {base}/v1/chat/completions`).
//!
//! Both implement [`ChatProvider`], taking a system prompt plus the
//! user/assistant turns and returning the answer text.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ApiConfig, ChatConfig};

const ANTHROPIC_VERSION: &str = "2023-06-01";

const PUBMED_TRANSLATOR_PROMPT: &str = "You are a medical search query translator. Given a user message in Korean about symptoms, exercise, or health, output ONLY a short English phrase optimized for PubMed search. Use medical terminology (e.g. \"lumbar disc herniation\", \"exercise therapy\", \"knee osteoarthritis\"). No explanation, no quotes, just the search terms. One line only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Generation {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, system: &str, messages: &[ChatMessage], gen: Generation) -> Result<String>;
}

// ============ Anthropic ============

pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(api_key: String, apis: &ApiConfig, chat: &ChatConfig) -> Result<Self> {
        Ok(Self {
            client: crate::http::client(chat.timeout_secs)?,
            base_url: apis.anthropic_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: chat.anthropic_model.clone(),
        })
    }
}

fn anthropic_text(response: &AnthropicResponse) -> String {
    response
        .content
        .iter()
        .filter(|c| c.content_type == "text")
        .filter_map(|c| c.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, system: &str, messages: &[ChatMessage], gen: Generation) -> Result<String> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: gen.max_tokens,
            system,
            messages,
            temperature: gen.temperature,
        };
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error ({}): {}", status, body));
        }
        let parsed: AnthropicResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;
        Ok(anthropic_text(&parsed).trim().to_string())
    }
}

// ============ OpenAI ============

pub struct OpenAIChatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl OpenAIChatProvider {
    pub fn new(api_key: String, apis: &ApiConfig, chat: &ChatConfig) -> Result<Self> {
        Ok(Self {
            client: crate::http::client(chat.timeout_secs)?,
            base_url: apis.openai_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: chat.openai_model.clone(),
        })
    }
}

fn openai_text(json: &serde_json::Value) -> Option<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
}

#[async_trait]
impl ChatProvider for OpenAIChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, system: &str, messages: &[ChatMessage], gen: Generation) -> Result<String> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(OpenAIMessage {
            role: "system",
            content: system,
        });
        wire.extend(messages.iter().map(|m| OpenAIMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        }));

        let request = OpenAIRequest {
            model: &self.model,
            messages: wire,
            max_tokens: gen.max_tokens,
            temperature: gen.temperature,
        };
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error ({}): {}", status, body));
        }
        let json: serde_json::Value = response.json().await?;
        openai_text(&json).ok_or_else(|| anyhow!("OpenAI response has no message content"))
    }
}

/// Providers available under the configured keys.
pub struct Providers {
    pub anthropic: Option<AnthropicProvider>,
    pub openai: Option<OpenAIChatProvider>,
}

impl Providers {
    pub fn from_config(apis: &ApiConfig, chat: &ChatConfig) -> Result<Self> {
        // Keys this short are placeholders, not credentials.
        let anthropic = apis
            .anthropic_key()
            .filter(|k| k.len() > 10)
            .map(|k| AnthropicProvider::new(k, apis, chat))
            .transpose()?;
        let openai = apis
            .openai_key()
            .map(|k| OpenAIChatProvider::new(k, apis, chat))
            .transpose()?;
        Ok(Self { anthropic, openai })
    }
}

// ============ PubMed query translation ============

/// Strips non-ASCII characters and collapses whitespace; returns the
/// input unchanged when fewer than two characters survive.
pub fn fallback_query(text: &str) -> String {
    let ascii: String = text
        .chars()
        .map(|c| if c.is_ascii() { c } else { ' ' })
        .collect();
    let collapsed = ascii.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() >= 2 {
        collapsed
    } else {
        text.to_string()
    }
}

/// Turns a (usually Korean) health question into English PubMed terms.
pub async fn translate_to_pubmed_query(openai: Option<&OpenAIChatProvider>, text: &str) -> String {
    let query = text.trim();
    if query.is_empty() {
        return String::new();
    }
    let Some(provider) = openai else {
        return fallback_query(query);
    };

    let gen = Generation {
        max_tokens: 80,
        temperature: Some(0.2),
    };
    match provider
        .complete(PUBMED_TRANSLATOR_PROMPT, &[ChatMessage::user(query)], gen)
        .await
    {
        Ok(translated) if !translated.is_empty() => translated,
        Ok(_) => fallback_query(query),
        Err(e) => {
            tracing::debug!(error = %e, "PubMed query translation failed");
            fallback_query(query)
        }
    }
}
