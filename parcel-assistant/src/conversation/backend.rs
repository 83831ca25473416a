//! Backend de l'assistant conversationnel
//!
//! Le backend reçoit un identifiant de modèle et une entrée textuelle
//! composée, et renvoie zéro ou plusieurs segments de texte.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Requête envoyée au backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantRequest {
    pub model: String,
    pub input: String,
}

/// Erreurs du backend
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Assistant auth error: API key rejected")]
    Unauthorized,

    #[error("Assistant API error: {status}: {message}")]
    Api { status: u16, message: String },
}

/// Backend conversationnel
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn complete(&self, request: &AssistantRequest) -> Result<Vec<String>, AssistantError>;
}

/// Client de l'API Responses d'OpenAI
pub struct OpenAiBackend {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(
        api_key: String,
        base_url: String,
        timeout: Option<Duration>,
    ) -> Result<Self, AssistantError> {
        let mut builder = Client::builder().user_agent(concat!(
            "parcel-assistant/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http_client: builder.build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl AssistantBackend for OpenAiBackend {
    async fn complete(&self, request: &AssistantRequest) -> Result<Vec<String>, AssistantError> {
        let url = format!("{}/v1/responses", self.base_url);
        debug!(model = %request.model, input_len = request.input.len(), "Assistant request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(AssistantError::Unauthorized),
            s if !s.is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(AssistantError::Api {
                    status: s.as_u16(),
                    message: message.chars().take(200).collect(),
                });
            }
            _ => {}
        }

        let body: ResponsesBody = response.json().await?;
        Ok(body
            .output
            .into_iter()
            .flat_map(|item| item.content)
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text)
            .collect())
    }
}
