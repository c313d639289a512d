//! Chat proxy in front of an OpenAI-compatible completion backend.

use std::sync::Arc;

use async_trait::async_trait;
use driftwood_api_types::{AiChatRequest, ChatMessage};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DeepSeekSettings;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<ChatChoice>>,
    #[serde(default)]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Transport-level failure classes a backend can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatBackendError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed")]
    Connect,
    #[error("tls handshake failed")]
    Tls,
    #[error("upstream answered {status}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("undecodable response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ChatCompletionBackend: Send + Sync {
    async fn complete(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ChatBackendError>;
}

/// Errors shown verbatim to chat users.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AiChatError {
    #[error("please configure DeepSeek API key")]
    MissingApiKey,
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("AI service returned no content, please retry later")]
    NoContent,
    #[error("AI service call failed: {body}")]
    Rejected { status: u16, body: String },
    #[error("AI service call failed, please check API key and network connection")]
    Unavailable { status: u16 },
    #[error("Request timed out, please retry later")]
    Timeout,
    #[error("Unable to connect to AI service, please check network")]
    Connect,
    #[error("SSL certificate verification failed")]
    Tls,
    #[error("Network request error: {0}")]
    Network(String),
    #[error("Processing error: {0}")]
    Processing(String),
}

impl From<ChatBackendError> for AiChatError {
    fn from(err: ChatBackendError) -> Self {
        match err {
            ChatBackendError::Status { status, body } if !body.trim().is_empty() => {
                Self::Rejected { status, body }
            }
            ChatBackendError::Status { status, .. } => Self::Unavailable { status },
            ChatBackendError::Timeout => Self::Timeout,
            ChatBackendError::Connect => Self::Connect,
            ChatBackendError::Tls => Self::Tls,
            ChatBackendError::Network(msg) => Self::Network(msg),
            ChatBackendError::Decode(msg) => Self::Processing(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<Value>,
}

#[derive(Clone)]
pub struct AiChatService {
    backend: Arc<dyn ChatCompletionBackend>,
    settings: DeepSeekSettings,
}

impl AiChatService {
    pub fn new(backend: Arc<dyn ChatCompletionBackend>, settings: DeepSeekSettings) -> Self {
        Self { backend, settings }
    }

    pub async fn chat(&self, request: AiChatRequest) -> Result<ChatReply, AiChatError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(AiChatError::MissingApiKey)?;

        if request.message.trim().is_empty() {
            return Err(AiChatError::EmptyMessage);
        }

        let completion = self.build_request(request);
        let outcome = self.backend.complete(api_key, &completion).await;

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                warn!(target = "driftwood::ai_chat", error = %err, "chat completion failed");
                counter!("driftwood_ai_chat_requests_total", "outcome" => "error").increment(1);
                return Err(err.into());
            }
        };

        let content = response
            .choices
            .as_deref()
            .and_then(<[ChatChoice]>::first)
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.content.clone())
            .ok_or_else(|| {
                counter!("driftwood_ai_chat_requests_total", "outcome" => "empty").increment(1);
                AiChatError::NoContent
            })?;

        counter!("driftwood_ai_chat_requests_total", "outcome" => "ok").increment(1);
        info!(
            target = "driftwood::ai_chat",
            response_id = response.id.as_deref().unwrap_or("-"),
            chars = content.chars().count(),
            "chat completion succeeded"
        );

        Ok(ChatReply {
            content,
            usage: response.usage,
        })
    }

    fn build_request(&self, request: AiChatRequest) -> ChatCompletionRequest {
        let system_prompt = request
            .system_prompt
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| self.settings.system_prompt.clone());

        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: system_prompt,
        }];
        messages.extend(
            request
                .history
                .unwrap_or_default()
                .into_iter()
                .filter(|entry| !entry.role.trim().is_empty() && !entry.content.trim().is_empty()),
        );
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.message,
        });

        ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: request.temperature.unwrap_or(self.settings.temperature),
            max_tokens: self.settings.max_tokens.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;
    use url::Url;

    use super::*;

    struct ScriptedBackend {
        reply: Result<ChatCompletionResponse, ChatBackendError>,
        seen: Mutex<Vec<ChatCompletionRequest>>,
    }

    impl ScriptedBackend {
        fn new(reply: Result<ChatCompletionResponse, ChatBackendError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<ChatCompletionRequest> {
            self.seen.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl ChatCompletionBackend for ScriptedBackend {
        async fn complete(
            &self,
            _api_key: &str,
            request: &ChatCompletionRequest,
        ) -> Result<ChatCompletionResponse, ChatBackendError> {
            self.seen.lock().expect("lock").push(request.clone());
            self.reply.clone()
        }
    }

    fn settings(api_key: Option<&str>) -> DeepSeekSettings {
        DeepSeekSettings {
            api_key: api_key.map(str::to_string),
            base_url: Url::parse("https://api.deepseek.com").expect("url"),
            chat_path: "/v1/chat/completions".into(),
            model: "deepseek-chat".into(),
            temperature: 0.7,
            max_tokens: NonZeroU32::new(2048).expect("non-zero"),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            system_prompt: "default prompt".into(),
        }
    }

    fn answer(content: &str) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: Some("chatcmpl-1".into()),
            choices: Some(vec![ChatChoice {
                index: Some(0),
                message: Some(ChoiceMessage {
                    role: Some("assistant".into()),
                    content: Some(content.into()),
                }),
                finish_reason: Some("stop".into()),
            }]),
            usage: Some(json!({"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8})),
        }
    }

    fn request(message: &str) -> AiChatRequest {
        AiChatRequest {
            message: message.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_key_or_blank_message_never_calls_backend() {
        let backend = ScriptedBackend::new(Ok(answer("hi")));
        let service = AiChatService::new(backend.clone(), settings(Some("  ")));
        assert_eq!(
            service.chat(request("hello")).await,
            Err(AiChatError::MissingApiKey)
        );

        let service = AiChatService::new(backend.clone(), settings(Some("sk-1")));
        assert_eq!(
            service.chat(request("   ")).await,
            Err(AiChatError::EmptyMessage)
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn message_list_keeps_prompt_history_and_user_order() {
        let backend = ScriptedBackend::new(Ok(answer("recommended")));
        let service = AiChatService::new(backend.clone(), settings(Some("sk-1")));

        let reply = service
            .chat(AiChatRequest {
                message: "what to read?".into(),
                system_prompt: Some("  ".into()),
                history: Some(vec![
                    ChatMessage {
                        role: "user".into(),
                        content: "earlier".into(),
                    },
                    ChatMessage {
                        role: "".into(),
                        content: "dropped".into(),
                    },
                    ChatMessage {
                        role: "assistant".into(),
                        content: " ".into(),
                    },
                ]),
                temperature: Some(0.2),
            })
            .await
            .expect("reply");

        assert_eq!(reply.content, "recommended");
        assert_eq!(reply.usage.as_ref().and_then(|u| u["total_tokens"].as_u64()), Some(8));

        let sent = &backend.calls()[0];
        let roles: Vec<&str> = sent.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "user"]);
        assert_eq!(sent.messages[0].content, "default prompt");
        assert_eq!(sent.messages[2].content, "what to read?");
        assert_eq!(sent.temperature, 0.2);
        assert_eq!(sent.max_tokens, 2048);
    }

    #[tokio::test]
    async fn empty_choices_mean_no_content() {
        let backend = ScriptedBackend::new(Ok(ChatCompletionResponse {
            choices: Some(vec![]),
            ..Default::default()
        }));
        let service = AiChatService::new(backend, settings(Some("sk-1")));
        let err = service.chat(request("hello")).await.expect_err("no content");
        assert_eq!(
            err.to_string(),
            "AI service returned no content, please retry later"
        );
    }

    #[test]
    fn backend_errors_map_to_user_messages() {
        let cases = [
            (
                ChatBackendError::Status {
                    status: 401,
                    body: "{\"error\":\"bad key\"}".into(),
                },
                "AI service call failed: {\"error\":\"bad key\"}",
            ),
            (
                ChatBackendError::Status {
                    status: 502,
                    body: String::new(),
                },
                "AI service call failed, please check API key and network connection",
            ),
            (ChatBackendError::Timeout, "Request timed out, please retry later"),
            (
                ChatBackendError::Connect,
                "Unable to connect to AI service, please check network",
            ),
            (ChatBackendError::Tls, "SSL certificate verification failed"),
            (
                ChatBackendError::Network("reset".into()),
                "Network request error: reset",
            ),
            (
                ChatBackendError::Decode("eof".into()),
                "Processing error: eof",
            ),
        ];

        for (backend_err, expected) in cases {
            assert_eq!(AiChatError::from(backend_err).to_string(), expected);
        }
    }
}
