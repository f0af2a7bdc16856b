//! OpenAI-compatible chat completion client used by the model translator.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::settings::LlmProviderConfig;

/// Endpoint details ready for making a call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEndpoint {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ResolvedEndpoint {
    /// `base_url` may be the API root or the full completions URL.
    pub fn from_config(config: &LlmProviderConfig) -> Self {
        let base = config.base_url.trim().trim_end_matches('/');
        let url = if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        };
        Self {
            url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_millis(config.request_timeout_ms.max(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

/// Build the POST for one system + user exchange.
pub fn build_request(
    client: &reqwest::Client,
    endpoint: &ResolvedEndpoint,
    system_prompt: &str,
    user_prompt: &str,
) -> reqwest::RequestBuilder {
    let body = ChatRequest {
        model: &endpoint.model,
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: Some(system_prompt.to_string()),
            },
            ChatMessage {
                role: "user".to_string(),
                content: Some(user_prompt.to_string()),
            },
        ],
        temperature: endpoint.temperature,
    };

    let request = client
        .post(&endpoint.url)
        .timeout(endpoint.timeout)
        .header("content-type", "application/json")
        .json(&body);
    match &endpoint.api_key {
        Some(key) => request.header("Authorization", format!("Bearer {key}")),
        None => request,
    }
}

/// Trimmed content of the first choice.
pub fn parse_response(json: &Value) -> Result<String, AppError> {
    let response: ChatResponse =
        serde_json::from_value(json.clone()).map_err(|e| AppError::Api {
            message: format!("Failed to parse chat response wrapper: {e}"),
        })?;
    let message = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .ok_or_else(|| AppError::Api {
            message: "No model choices returned.".to_string(),
        })?;
    let content = message.content.unwrap_or_default().trim().to_string();
    if content.is_empty() {
        return Err(AppError::Api {
            message: "Model returned empty content.".to_string(),
        });
    }
    Ok(content)
}

// ── Client ───────────────────────────────────────────────────────

/// One system + user exchange returning the reply text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AppError>;
}

pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoint: ResolvedEndpoint,
}

impl HttpCompletionClient {
    pub fn new(config: &LlmProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: ResolvedEndpoint::from_config(config),
        }
    }

    pub fn endpoint(&self) -> &ResolvedEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AppError> {
        tracing::debug!(url = %self.endpoint.url, model = %self.endpoint.model, "chat completion");
        let response = build_request(&self.client, &self.endpoint, system_prompt, user_prompt)
            .send()
            .await
            .map_err(|e| AppError::Api {
                message: format!("API request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Api {
                message: format!("HTTP error: {status}\n{text}"),
            });
        }

        let json: Value = response.json().await.map_err(|e| AppError::Api {
            message: format!("Failed to parse chat response wrapper: {e}"),
        })?;
        parse_response(&json)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn endpoint_appends_completions_path_once() {
        let mut config = LlmProviderConfig::default();
        assert_eq!(
            ResolvedEndpoint::from_config(&config).url,
            "http://localhost:1234/v1/chat/completions"
        );
        config.base_url = "http://host/v1/chat/completions/".into();
        assert_eq!(
            ResolvedEndpoint::from_config(&config).url,
            "http://host/v1/chat/completions"
        );
        config.api_key = Some(String::new());
        assert_eq!(ResolvedEndpoint::from_config(&config).api_key, None);
    }

    #[test]
    fn request_body_is_openai_shaped() {
        let mut config = LlmProviderConfig::default();
        config.api_key = Some("sk-test".into());
        let endpoint = ResolvedEndpoint::from_config(&config);
        let request = build_request(&reqwest::Client::new(), &endpoint, "sys", "hello")
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), endpoint.url);
        assert_eq!(
            request.headers()["Authorization"].to_str().unwrap(),
            "Bearer sk-test"
        );
        let body: Value =
            serde_json::from_slice(request.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn response_content_is_trimmed() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": "  {\"a\":1}\n"}}]});
        assert_eq!(parse_response(&json).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn response_errors() {
        let err = parse_response(&json!({"choices": []})).unwrap_err();
        assert_eq!(err.to_string(), "API error: No model choices returned.");
        let err = parse_response(&json!({"choices": [{"message": {"role": "assistant", "content": "  "}}]}))
            .unwrap_err();
        assert_eq!(err.to_string(), "API error: Model returned empty content.");
        let err = parse_response(&json!({"choices": [{}]})).unwrap_err();
        assert_eq!(err.to_string(), "API error: No model choices returned.");
        assert!(parse_response(&json!({"choices": 3})).is_err());
    }
}
