//! OpenAI-compatible HTTP completion client.

use super::completion::{
    ChatMessage, Completion, CompletionClient, CompletionError, CompletionOptions,
    EmbeddingOptions,
};
use crate::config::CompletionSettings;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Completion client for any OpenAI-compatible `/chat/completions` API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    settings: CompletionSettings,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Creates a client with an explicit API key.
    pub fn new(settings: CompletionSettings, api_key: impl Into<String>) -> Result<Self, CompletionError> {
        let timeout = settings
            .timeout()
            .map_err(|e| CompletionError::Configuration(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        Ok(Self {
            settings,
            api_key: api_key.into(),
            client,
        })
    }

    /// Creates a client reading the key from `settings.api_key_env`.
    pub fn from_env(settings: CompletionSettings) -> Result<Self, CompletionError> {
        let key = std::env::var(&settings.api_key_env).map_err(|_| CompletionError::Upstream {
            status: 401,
            message: format!("{} is not set", settings.api_key_env),
        })?;
        Self::new(settings, key)
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, CompletionError> {
        let url = format!("{}/{path}", self.settings.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Upstream {
                        status: 408,
                        message: e.to_string(),
                    }
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CompletionError::Upstream {
                status: status.as_u16(),
                message: text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))
    }
}

fn parse_choice(data: &Value) -> Result<Completion, CompletionError> {
    let message = data
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| CompletionError::Malformed("No message in response".to_string()))?;

    if let Some(call) = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .and_then(|calls| calls.first())
    {
        let function = call
            .get("function")
            .ok_or_else(|| CompletionError::Malformed("Tool call without function".to_string()))?;
        let name = function
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let raw = function
            .get("arguments")
            .and_then(Value::as_str)
            .unwrap_or("{}");
        let arguments =
            serde_json::from_str(raw).map_err(|e| CompletionError::Malformed(e.to_string()))?;
        return Ok(Completion::ToolCall { name, arguments });
    }

    message
        .get("content")
        .and_then(Value::as_str)
        .map(Completion::text)
        .ok_or_else(|| CompletionError::Malformed("Empty content".to_string()))
}

fn parse_embeddings(data: &Value) -> Result<Vec<Vec<f32>>, CompletionError> {
    let items = data
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| CompletionError::Malformed("No data in embedding response".to_string()))?;

    items
        .iter()
        .map(|item| {
            item.get("embedding")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_f64)
                        .map(|v| v as f32)
                        .collect()
                })
                .ok_or_else(|| CompletionError::Malformed("Embedding item without vector".to_string()))
        })
        .collect()
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, CompletionError> {
        let mut payload = json!({
            "model": options.model.as_deref().unwrap_or(&self.settings.model),
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.settings.temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.settings.max_tokens),
        });
        if options.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let data = self.post("chat/completions", &payload).await?;
        parse_choice(&data)
    }

    async fn embed(
        &self,
        input: &[String],
        options: &EmbeddingOptions,
    ) -> Result<Vec<Vec<f32>>, CompletionError> {
        let payload = json!({
            "model": options.model.as_deref().unwrap_or(&self.settings.embedding_model),
            "input": input,
        });
        let data = self.post("embeddings", &payload).await?;
        parse_embeddings(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_choice() {
        let data = json!({"choices": [{"message": {"role": "assistant", "content": "Hello"}}]});
        assert_eq!(parse_choice(&data).unwrap(), Completion::text("Hello"));
    }

    #[test]
    fn test_parse_tool_call_choice() {
        let data = json!({"choices": [{"message": {
            "content": null,
            "tool_calls": [{"function": {"name": "save_plan", "arguments": "{\"days\":4}"}}]
        }}]});
        assert_eq!(
            parse_choice(&data).unwrap(),
            Completion::ToolCall {
                name: "save_plan".into(),
                arguments: json!({"days": 4})
            }
        );
    }

    #[test]
    fn test_parse_missing_choices_is_malformed() {
        let err = parse_choice(&json!({})).unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_invalid_timeout_is_configuration_error() {
        let settings = CompletionSettings {
            timeout_seconds: -1.0,
            ..CompletionSettings::default()
        };
        let err = OpenAiClient::new(settings, "key").unwrap_err();
        assert!(matches!(err, CompletionError::Configuration(_)));
        let coach: crate::errors::CoachError = err.into();
        assert_eq!(coach.code(), Some(crate::errors::ErrorCode::Configuration));
    }

    #[test]
    fn test_parse_embeddings() {
        let data = json!({"data": [{"embedding": [0.5, 1.0]}, {"embedding": [0.25]}]});
        assert_eq!(parse_embeddings(&data).unwrap(), vec![vec![0.5, 1.0], vec![0.25]]);
    }
}
