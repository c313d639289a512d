//! DeepSeek chat-completions client.

use std::error::Error as StdError;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::application::ai_chat::{
    ChatBackendError, ChatCompletionBackend, ChatCompletionRequest, ChatCompletionResponse,
};
use crate::config::DeepSeekSettings;

use super::error::InfraError;

pub struct DeepSeekClient {
    client: Client,
    endpoint: String,
}

impl DeepSeekClient {
    pub fn new(settings: &DeepSeekSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("driftwood/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: join_endpoint(settings.base_url.as_str(), &settings.chat_path),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Exactly one `/` between base and path, whatever either side carries.
pub fn join_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[async_trait]
impl ChatCompletionBackend for DeepSeekClient {
    async fn complete(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ChatBackendError> {
        debug!(
            target = "driftwood::llm",
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            return Err(ChatBackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|err| ChatBackendError::Decode(err.to_string()))
    }
}

fn classify(err: reqwest::Error) -> ChatBackendError {
    if err.is_timeout() {
        return ChatBackendError::Timeout;
    }
    if mentions_tls(&err) {
        return ChatBackendError::Tls;
    }
    if err.is_connect() {
        return ChatBackendError::Connect;
    }
    if err.is_decode() {
        return ChatBackendError::Decode(err.to_string());
    }
    ChatBackendError::Network(err.to_string())
}

fn mentions_tls(err: &reqwest::Error) -> bool {
    let mut current: Option<&dyn StdError> = Some(err);
    while let Some(inner) = current {
        let text = inner.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("invalid peer") {
            return true;
        }
        current = inner.source();
    }
    false
}
