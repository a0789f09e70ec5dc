//! Text-generation client (OpenAI-compatible chat completions)

use super::{build_http_client, send_json};
use crate::lookup::LookupError;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TEXTGEN_BASE_URL: &str = "https://api.openai.com/v1";
pub const TEXTGEN_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const TEXTGEN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct TextGenClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl TextGenClient {
    pub fn new(
        base_url: Option<String>,
        api_key: impl Into<String>,
        model: Option<String>,
    ) -> Result<Self, LookupError> {
        Ok(Self {
            http: build_http_client(TEXTGEN_TIMEOUT)?,
            base_url: base_url
                .unwrap_or_else(|| TEXTGEN_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| TEXTGEN_DEFAULT_MODEL.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Single-turn completion; returns the raw reply text
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LookupError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(url = %url, model = %self.model, "Requesting completion");

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
        };

        let request = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body);
        let response: ChatResponse = send_json(request, TEXTGEN_TIMEOUT, "completion").await?;

        reply_text(response)
    }
}

fn reply_text(response: ChatResponse) -> Result<String, LookupError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(LookupError::EmptyResult)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_text_takes_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "[]"}}]}"#,
        )
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), "[]");
    }

    #[test]
    fn test_empty_reply_is_empty_result() {
        let none: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(reply_text(none), Err(LookupError::EmptyResult));

        let blank: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#).unwrap();
        assert_eq!(reply_text(blank), Err(LookupError::EmptyResult));
    }

    #[test]
    fn test_defaults() {
        let client = TextGenClient::new(None, "sk-test", None).unwrap();
        assert_eq!(client.model(), TEXTGEN_DEFAULT_MODEL);
        assert_eq!(client.base_url, TEXTGEN_BASE_URL);
    }
}
