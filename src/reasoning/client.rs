use super::ReasoningClient;
use crate::config::LlmSettings;
use crate::error::ReasoningError;
use crate::util::truncate_str;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Characters of an error body kept in a [`ReasoningError::BadRequest`]
const ERROR_BODY_CHARS: usize = 200;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions transport. One HTTP request per `send`.
pub struct HttpReasoningClient {
    client: reqwest::Client,
    settings: LlmSettings,
    api_key: Option<String>,
}

impl HttpReasoningClient {
    pub fn new(settings: LlmSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        let api_key = settings.resolve_api_key();
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }
}

fn classify_status(status: u16, body: &str) -> ReasoningError {
    match status {
        401 | 403 => ReasoningError::Auth { status },
        429 => ReasoningError::RateLimited,
        500..=599 => ReasoningError::Server { status },
        _ => ReasoningError::BadRequest {
            status,
            body: truncate_str(body, ERROR_BODY_CHARS).to_string(),
        },
    }
}

fn classify_transport(err: reqwest::Error) -> ReasoningError {
    if err.is_timeout() {
        ReasoningError::Timeout
    } else if err.is_connect() || err.is_request() {
        ReasoningError::Connect(err.to_string())
    } else {
        ReasoningError::Malformed(err.to_string())
    }
}

/// Pull `choices[0].message.content` out of a successful response body.
fn extract_content(body: &str) -> Result<String, ReasoningError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        ReasoningError::Malformed(format!("{}: {}", e, truncate_str(body, ERROR_BODY_CHARS)))
    })?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ReasoningError::EmptyResponse)
}

#[async_trait]
impl ReasoningClient for HttpReasoningClient {
    async fn send(&self, system: &str, user: &str) -> Result<String, ReasoningError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        let mut builder = self
            .client
            .post(&self.settings.api_url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(classify_transport)?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }
        extract_content(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(401, ""), ReasoningError::Auth { status: 401 });
        assert_eq!(classify_status(429, ""), ReasoningError::RateLimited);
        assert_eq!(classify_status(502, ""), ReasoningError::Server { status: 502 });
        assert!(matches!(
            classify_status(400, "bad model"),
            ReasoningError::BadRequest { status: 400, .. }
        ));
    }

    #[test]
    fn test_extract_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "[]"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "[]");
    }

    #[test]
    fn test_empty_content_is_transient() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "  "}}]}"#;
        let err = extract_content(body).unwrap_err();
        assert_eq!(err, ReasoningError::EmptyResponse);
        assert!(err.is_transient());

        let err = extract_content(r#"{"choices": []}"#).unwrap_err();
        assert_eq!(err, ReasoningError::EmptyResponse);
    }

    #[test]
    fn test_unreadable_envelope_is_malformed() {
        assert!(matches!(
            extract_content("<html>gateway</html>"),
            Err(ReasoningError::Malformed(_))
        ));
    }
}
