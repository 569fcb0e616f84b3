pub mod json_repair;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::LoregraphError;

/// Token usage reported by a backend, when it reports one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Result of a single completion call: the raw text plus any usage data.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Usage,
}

/// Configuration for the LLM backend, loaded from env vars the way the
/// teacher's `DbConfig` is loaded from env/file.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: Backend,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenAi,
    Anthropic,
    Local,
}

impl LlmConfig {
    /// `LOREGRAPH_LLM_BACKEND` in {openai, anthropic, local}, `LOREGRAPH_LLM_API_KEY`,
    /// `LOREGRAPH_LLM_MODEL`, `LOREGRAPH_LLM_BASE_URL`.
    pub fn from_env() -> Self {
        let backend = match std::env::var("LOREGRAPH_LLM_BACKEND")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "anthropic" => Backend::Anthropic,
            "local" => Backend::Local,
            _ => Backend::OpenAi,
        };
        let model = std::env::var("LOREGRAPH_LLM_MODEL").unwrap_or_else(|_| match backend {
            Backend::OpenAi => "gpt-4o-mini".to_string(),
            Backend::Anthropic => "claude-3-5-haiku-latest".to_string(),
            Backend::Local => "local".to_string(),
        });
        Self {
            backend,
            api_key: std::env::var("LOREGRAPH_LLM_API_KEY").ok(),
            model,
            base_url: std::env::var("LOREGRAPH_LLM_BASE_URL").ok(),
            timeout: Duration::from_secs(
                std::env::var("LOREGRAPH_LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }
}

/// Options controlling a single completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// When set, ask the backend to constrain output to a JSON object.
    pub json_mode: bool,
}

/// Abstract `(system, prompt[, format]) -> (content, usage)` contract every
/// backend implements. Streaming is intentionally out of this trait: callers
/// that need a token stream use [`LlmBackend::stream`] directly.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LoregraphError>;
}

pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self, LoregraphError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LoregraphError::Llm("missing LOREGRAPH_LLM_API_KEY".into()))?;
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).no_proxy().build()?,
            api_key,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LoregraphError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });
        if let Some(t) = options.temperature {
            body["temperature"] = Value::from(t);
        }
        if let Some(mt) = options.max_tokens {
            body["max_tokens"] = Value::from(mt);
        }
        if options.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LoregraphError::Llm(format!("openai error {status}: {text}")));
        }

        let parsed: OpenAiResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        Ok(Completion { content, usage })
    }
}

pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(config: &LlmConfig) -> Result<Self, LoregraphError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LoregraphError::Llm("missing LOREGRAPH_LLM_API_KEY".into()))?;
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).no_proxy().build()?,
            api_key,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com/v1".to_string()),
        })
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LoregraphError> {
        let body = serde_json::json!({
            "model": self.model,
            "system": system,
            "max_tokens": options.max_tokens.unwrap_or(4096),
            "temperature": options.temperature.unwrap_or(0.2),
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LoregraphError::Llm(format!(
                "anthropic error {status}: {text}"
            )));
        }

        let parsed: AnthropicResponse = resp.json().await?;
        let content = parsed
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");
        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            })
            .unwrap_or_default();
        Ok(Completion { content, usage })
    }
}

/// A self-hosted completion server exposing an OpenAI-compatible
/// `/v1/chat/completions` endpoint but requiring no API key.
pub struct LocalBackend {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl LocalBackend {
    pub fn new(config: &LlmConfig) -> Result<Self, LoregraphError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).no_proxy().build()?,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://127.0.0.1:8080/v1".to_string()),
        })
    }
}

#[async_trait]
impl LlmBackend for LocalBackend {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LoregraphError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "temperature": options.temperature.unwrap_or(0.2),
            "max_tokens": options.max_tokens.unwrap_or(4096),
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LoregraphError::Llm(format!("local backend error {status}: {text}")));
        }

        let parsed: OpenAiResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        Ok(Completion { content, usage })
    }
}

/// Construct the configured backend.
pub fn create_backend(config: &LlmConfig) -> Result<Box<dyn LlmBackend>, LoregraphError> {
    match config.backend {
        Backend::OpenAi => Ok(Box::new(OpenAiBackend::new(config)?)),
        Backend::Anthropic => Ok(Box::new(AnthropicBackend::new(config)?)),
        Backend::Local => Ok(Box::new(LocalBackend::new(config)?)),
    }
}

/// Call the backend and parse its content as JSON, repairing truncation first.
/// This is the shape almost every pipeline stage needs: a structured-output
/// call that must survive a response cut short by a token limit.
pub async fn complete_json(
    backend: &dyn LlmBackend,
    system: &str,
    prompt: &str,
    options: &CompletionOptions,
) -> Result<Value, LoregraphError> {
    let completion = backend.complete(system, prompt, options).await?;
    let repaired = json_repair::repair_truncated_json(&completion.content);
    serde_json::from_str(&repaired)
        .map_err(|e| LoregraphError::Extraction(format!("could not parse LLM JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_config_defaults_to_localhost() {
        std::env::remove_var("LOREGRAPH_LLM_BASE_URL");
        let cfg = LlmConfig {
            backend: Backend::Local,
            api_key: None,
            model: "local".into(),
            base_url: None,
            timeout: Duration::from_secs(10),
        };
        let backend = LocalBackend::new(&cfg).unwrap();
        assert_eq!(backend.base_url, "http://127.0.0.1:8080/v1");
    }
}
