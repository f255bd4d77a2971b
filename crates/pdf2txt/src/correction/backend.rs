use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::CorrectionError;
use crate::config::CorrectionConfig;

pub const SYSTEM_INSTRUCTION: &str = "You are an expert at cleaning up text produced by \
optical character recognition. Fix spelling and grammar mistakes caused by OCR without \
changing the meaning. Remove page numbers, running headers and footers, layout artifacts \
and stray decorative characters. Keep all of the main text. Answer with the cleaned text \
only: no introduction, no conclusion, never start with a phrase such as \"Here is the \
corrected text\".";

/// One slice of a document sent for correction. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub index: usize,
    pub total: usize,
    pub content: String,
}

impl ChunkRequest {
    pub fn user_message(&self) -> String {
        format!("Part {} of {}:\n{}", self.index, self.total, self.content)
    }
}

#[async_trait]
pub trait CorrectionBackend: Send + Sync {
    async fn correct_chunk(
        &self,
        credential: &SecretString,
        request: &ChunkRequest,
    ) -> Result<String, CorrectionError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct HttpCorrectionBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl HttpCorrectionBackend {
    pub fn new(config: &CorrectionConfig) -> Result<Self, CorrectionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CorrectionError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CorrectionBackend for HttpCorrectionBackend {
    async fn correct_chunk(
        &self,
        credential: &SecretString,
        request: &ChunkRequest,
    ) -> Result<String, CorrectionError> {
        let user_message = request.user_message();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: &user_message,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CorrectionError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(map_transport_error)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CorrectionError::EmptyResponse)
    }
}

fn map_transport_error(e: reqwest::Error) -> CorrectionError {
    if e.is_timeout() {
        CorrectionError::Timeout
    } else if e.is_decode() {
        CorrectionError::EmptyResponse
    } else {
        CorrectionError::Request(e.to_string())
    }
}
