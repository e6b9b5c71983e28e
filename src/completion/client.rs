use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};
use url::Url;

use crate::config::CompletionConfig;
use crate::db::models::{Message, Sender, Tone};
use crate::error::{AppError, CompletionError};
use crate::Result;

/// Keys with this prefix belong to the OpenRouter gateway.
pub const OPENROUTER_KEY_PREFIX: &str = "sk-or-";
pub const FALLBACK_REPLY: &str = "Sorry, I could not generate a response.";
const APP_TITLE: &str = "ChatMate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl From<Sender> for Role {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => Role::User,
            Sender::Ai => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatTurn>,
}

impl CompletionRequest {
    /// System prompt for `tone`, then the prior history in order, then the new
    /// user message.
    pub fn for_conversation(tone: Tone, history: &[Message], content: &str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatTurn::new(Role::System, tone.system_prompt()));
        messages.extend(
            history
                .iter()
                .map(|m| ChatTurn::new(Role::from(m.sender), m.content.clone())),
        );
        messages.push(ChatTurn::new(Role::User, content));
        Self { messages }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Exactly one outbound request per call; no retry.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    OpenRouter,
}

impl Provider {
    pub fn from_api_key(api_key: &str) -> Self {
        if api_key.starts_with(OPENROUTER_KEY_PREFIX) {
            Provider::OpenRouter
        } else {
            Provider::OpenAi
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct HttpCompletionClient {
    client: reqwest::Client,
    config: CompletionConfig,
    provider: Provider,
    endpoint: Url,
}

impl HttpCompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let provider = Provider::from_api_key(&config.api_key);
        let raw = match provider {
            Provider::OpenAi => &config.openai_url,
            Provider::OpenRouter => &config.openrouter_url,
        };
        let endpoint = Url::parse(raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid completion URL {}: {}", raw, e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        info!("Completion client using {:?} at {}", provider, endpoint);
        Ok(Self {
            client,
            config,
            provider,
            endpoint,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        match self.provider {
            Provider::OpenAi => &self.config.model,
            Provider::OpenRouter => &self.config.openrouter_model,
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| AppError::ConfigError(format!("Invalid API key: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);

        if self.provider == Provider::OpenRouter {
            let referer = HeaderValue::from_str(&self.config.referer)
                .map_err(|e| AppError::ConfigError(format!("Invalid referer: {}", e)))?;
            headers.insert(HeaderName::from_static("http-referer"), referer);
            headers.insert(HeaderName::from_static("x-title"), HeaderValue::from_static(APP_TITLE));
        }
        Ok(headers)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = json!({
            "model": self.model(),
            "messages": request.messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        debug!("Sending {} turns to {}", request.messages.len(), self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail: serde_json::Value = response.json().await.unwrap_or_default();
            let message = detail["error"]["message"]
                .as_str()
                .unwrap_or("Unknown error")
                .to_string();
            error!("Completion endpoint returned {}: {}", status, message);
            return Err(CompletionError::Status {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| FALLBACK_REPLY.to_string());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use chrono::Utc;

    fn message(sender: Sender, content: &str) -> Message {
        Message {
            message_id: content.to_string(),
            chat_id: "c1".into(),
            sender,
            content: content.to_string(),
            timestamp: Utc::now(),
            is_voice: false,
        }
    }

    #[test]
    fn test_provider_selection() {
        assert_eq!(Provider::from_api_key("sk-or-v1-abc"), Provider::OpenRouter);
        assert_eq!(Provider::from_api_key("sk-proj-abc"), Provider::OpenAi);
        assert_eq!(Provider::from_api_key(""), Provider::OpenAi);
    }

    #[test]
    fn test_request_maps_roles_in_order() {
        let history = vec![message(Sender::User, "hi"), message(Sender::Ai, "hello!")];
        let request = CompletionRequest::for_conversation(Tone::Professional, &history, "how are you");

        let roles: Vec<Role> = request.messages.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(request.messages[0].content, Tone::Professional.system_prompt());
        assert_eq!(request.messages[3].content, "how are you");
    }

    #[test]
    fn test_ai_turns_go_out_as_assistant() {
        assert_eq!(Role::from(Sender::Ai), Role::Assistant);
        assert_eq!(Role::from(Sender::User), Role::User);
        let turn = ChatTurn::new(Sender::Ai.into(), "hello");
        assert_eq!(serde_json::to_value(&turn).unwrap()["role"], "assistant");
    }

    #[test]
    fn test_model_follows_provider() {
        let mut config = Settings::new_for_test().unwrap().completion;
        let client = HttpCompletionClient::new(config.clone()).unwrap();
        assert_eq!(client.provider(), Provider::OpenAi);
        assert_eq!(client.model(), "gpt-3.5-turbo");

        config.api_key = "sk-or-v1-test".into();
        let client = HttpCompletionClient::new(config).unwrap();
        assert_eq!(client.provider(), Provider::OpenRouter);
        assert_eq!(client.model(), "openai/gpt-3.5-turbo");
        let headers = client.headers().unwrap();
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(String::from);
        assert_eq!(header("X-Title").as_deref(), Some("ChatMate"));
        assert_eq!(header("HTTP-Referer").as_deref(), Some("https://chatmate.app"));
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let mut config = Settings::new_for_test().unwrap().completion;
        config.openai_url = "not a url".into();
        assert!(matches!(
            HttpCompletionClient::new(config),
            Err(AppError::ConfigError(_))
        ));
    }
}
