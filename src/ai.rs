//! Client for the hosted AI completion backend.
//!
//! Thin reqwest wrapper around the OpenAI-compatible chat-completions
//! endpoint, with image URL attachments on the user message. Failures are
//! surfaced, never retried.

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::constants::{AI_MAX_TOKENS, AI_MODEL, AI_TEMPERATURE};

#[derive(Clone)]
pub struct AiClient {
    base_url: String,
    http: Client,
}

impl AiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// Run a chat completion. The token is attached as a bearer when
    /// present; the backend rejects unauthenticated calls with 401.
    pub async fn chat_completion(
        &self,
        token: Option<&str>,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, AiError> {
        let url = format!("{}/api/v1/ai/chat/completions", self.base_url);

        let mut req = self.http.post(url).json(request);
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<ChatCompletion>().await.map_err(AiError::Http)
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Build the scoring request: fixed model, temperature and token
    /// ceiling, with image attachments when the post has any.
    pub fn scoring(system_prompt: String, user_prompt: String, image_urls: &[String]) -> Self {
        let mut user = ChatMessage::user(user_prompt);
        if !image_urls.is_empty() {
            user.images = Some(
                image_urls
                    .iter()
                    .map(|url| ImageAttachment { url: url.clone() })
                    .collect(),
            );
        }

        ChatRequest {
            model: AI_MODEL.to_string(),
            messages: vec![ChatMessage::system(system_prompt), user],
            temperature: AI_TEMPERATURE,
            max_tokens: AI_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageAttachment>>,
}

impl ChatMessage {
    pub fn system(content: String) -> Self {
        ChatMessage {
            role: "system",
            content,
            images: None,
        }
    }

    pub fn user(content: String) -> Self {
        ChatMessage {
            role: "user",
            content,
            images: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageAttachment {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl ChatCompletion {
    /// Text content of the first choice, when the backend returned one.
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.message.as_ref()?.content.as_deref()
    }
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug)]
pub enum AiError {
    Http(reqwest::Error),
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        AiError::Http(e)
    }
}

impl std::fmt::Display for AiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiError::Http(e) => write!(f, "HTTP error: {}", e),
            AiError::Api { status, message } => {
                write!(f, "AI API error ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for AiError {}
