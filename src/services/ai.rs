//! OpenAI-compatible chat completion client.
//!
//! `ai.endpoint` is the API base (for example `https://api.openai.com/v1`);
//! requests go to `{endpoint}/chat/completions` and `{endpoint}/models`.

use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionRequest, ServiceError};
use crate::config::AiConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

pub struct AiClient {
    client: reqwest::Client,
}

impl Default for AiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AiClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn base(settings: &AiConfig) -> Result<&str, ServiceError> {
        if !settings.is_configured() || settings.endpoint.trim().is_empty() {
            return Err(ServiceError::Unavailable("AI service"));
        }
        Ok(settings.endpoint.trim().trim_end_matches('/'))
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let base = Self::base(&request.settings)?;
        let body = build_body(request);
        debug!(
            "completion request: model={} turns={}",
            body.model,
            body.messages.len()
        );
        let response = self
            .client
            .post(format!("{}/chat/completions", base))
            .bearer_auth(request.settings.api_key.trim())
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Request(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Request(format!("status {}: {}", status, message)));
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Request(format!("bad response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::Request("empty completion".into()))
    }

    pub async fn list_models(&self, settings: &AiConfig) -> Result<Vec<String>, ServiceError> {
        let base = Self::base(settings)?;
        let response = self
            .client
            .get(format!("{}/models", base))
            .bearer_auth(settings.api_key.trim())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ServiceError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ServiceError::Request(format!("status {}", response.status())));
        }
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| ServiceError::Request(format!("bad response: {}", e)))?;
        let mut ids: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
        ids.sort();
        Ok(ids)
    }
}

fn build_body(request: &CompletionRequest) -> ChatBody<'_> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    if !request.settings.system_instruction.trim().is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: &request.settings.system_instruction,
        });
    }
    for turn in &request.history {
        messages.push(ChatMessage {
            role: if turn.from_bot { "assistant" } else { "user" },
            content: &turn.text,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });
    ChatBody {
        model: &request.settings.model,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::HistoryTurn;

    #[test]
    fn body_orders_system_history_then_prompt() {
        let request = CompletionRequest {
            settings: AiConfig {
                api_key: "k".into(),
                model: "m1".into(),
                ..AiConfig::default()
            },
            history: vec![
                HistoryTurn { text: "hi".into(), from_bot: false },
                HistoryTurn { text: "hello".into(), from_bot: true },
            ],
            prompt: "how are you".into(),
        };
        let json = serde_json::to_value(build_body(&request)).unwrap();
        assert_eq!(json["model"], "m1");
        let roles: Vec<&str> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(json["messages"][3]["content"], "how are you");
    }

    #[test]
    fn missing_endpoint_is_unavailable() {
        let settings = AiConfig {
            api_key: "k".into(),
            ..AiConfig::default()
        };
        assert!(matches!(
            AiClient::base(&settings),
            Err(ServiceError::Unavailable(_))
        ));
        let settings = AiConfig {
            api_key: "k".into(),
            endpoint: "https://api.example.org/v1/".into(),
            ..AiConfig::default()
        };
        assert_eq!(AiClient::base(&settings).unwrap(), "https://api.example.org/v1");
    }

    #[test]
    fn parses_completion_shape() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":" Hi! "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some(" Hi! "));
    }
}
