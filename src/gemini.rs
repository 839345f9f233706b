use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use crate::chat::ChatTransport;
use crate::config::ChatConfig;

#[derive(Debug, Error)]
pub enum ChatInitError {
    #[error("{var} not found in the environment or .env file")]
    CredentialMissing { var: String },

    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentRequest {
    /// A fresh conversation holding only `message`.
    fn single_turn(message: &str) -> Self {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(message.to_string()),
                }],
            }],
        }
    }
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String> {
        let candidate = match self.candidates.into_iter().next() {
            Some(c) => c,
            None => {
                let reason = self
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .unwrap_or_else(|| "no candidates returned".to_string());
                return Err(anyhow!("response contained no text ({})", reason));
            }
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "empty content".to_string());
            return Err(anyhow!("response contained no text ({})", reason));
        }
        Ok(text)
    }
}

pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn from_env(config: &ChatConfig) -> Result<Self, ChatInitError> {
        Self::with_key(std::env::var(&config.api_key_env).ok(), config)
    }

    pub fn with_key(api_key: Option<String>, config: &ChatConfig) -> Result<Self, ChatInitError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ChatInitError::CredentialMissing {
                var: config.api_key_env.clone(),
            })?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(GeminiClient {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client: builder.build()?,
        })
    }

    pub fn get_model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let model = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/v1beta/{}:generateContent", self.base_url, model)
    }

    pub async fn generate(&self, message: &str) -> Result<String> {
        let request = GenerateContentRequest::single_turn(message);
        tracing::debug!(model = %self.model, chars = message.len(), "sending chat message");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error ({}): {}", status, body));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parsed.into_text()
    }
}

impl ChatTransport for GeminiClient {
    fn send<'a>(&'a self, message: &'a str) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.generate(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatBridge, WARNING_MARKER};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config() -> ChatConfig {
        ChatConfig::default()
    }

    /// Answer every request on a local port with the same status and JSON body.
    async fn canned_server(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    /// Drain headers and the Content-Length body so closing doesn't reset the connection.
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            data.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    fn client_for(base_url: String) -> GeminiClient {
        let mut cfg = config();
        cfg.base_url = base_url;
        cfg.timeout_secs = Some(5);
        GeminiClient::with_key(Some("secret".to_string()), &cfg).unwrap()
    }

    #[test]
    fn test_missing_key() {
        let err = GeminiClient::with_key(None, &config()).err().unwrap();
        assert!(matches!(err, ChatInitError::CredentialMissing { ref var } if var == "GEMINI_API_KEY"));

        let blank = GeminiClient::with_key(Some("   ".to_string()), &config());
        assert!(matches!(blank, Err(ChatInitError::CredentialMissing { .. })));
    }

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::with_key(Some("secret".to_string()), &config()).unwrap();
        assert_eq!(client.get_model(), "models/gemini-2.0-flash");
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );

        let mut cfg = config();
        cfg.base_url = "http://localhost:8080/".to_string();
        cfg.model = "gemini-1.5-flash".to_string();
        let client = GeminiClient::with_key(Some("secret".to_string()), &cfg).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1beta/models/gemini-1.5-flash:generateContent");
    }

    #[test]
    fn test_request_has_single_user_turn() {
        let value = serde_json::to_value(GenerateContentRequest::single_turn("What is a referendum?")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "What is a referendum?"}]}]
            })
        );
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "A referendum "}, {"text": "is a direct vote."}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"totalTokenCount": 12}
            }"#,
        )
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "A referendum is a direct vote.");
    }

    #[test]
    fn test_blocked_prompt_is_an_error() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_candidate_without_text_is_an_error() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "RECITATION"}]}"#).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("RECITATION"));
    }

    #[tokio::test]
    async fn test_error_status_reports_status_and_body() {
        let base_url = canned_server(
            "429 Too Many Requests",
            r#"{"error": {"code": 429, "status": "RESOURCE_EXHAUSTED"}}"#,
        )
        .await;
        let client = client_for(base_url);

        let err = client.generate("Who appoints judges?").await.unwrap_err().to_string();
        assert!(err.contains("429"), "{}", err);
        assert!(err.contains("RESOURCE_EXHAUSTED"), "{}", err);

        let reply = ChatBridge::ready(Arc::new(client)).ask("Who appoints judges?").await;
        assert!(reply.starts_with(&format!("{} Error: ", WARNING_MARKER)), "{}", reply);
        assert!(reply.contains("429"), "{}", reply);
    }

    #[tokio::test]
    async fn test_success_status_returns_candidate_text() {
        let base_url = canned_server(
            "200 OK",
            r#"{"candidates": [{"content": {"role": "model", "parts": [{"text": "  The president, with Senate consent. "}]}}]}"#,
        )
        .await;
        let client = client_for(base_url);

        assert_eq!(
            client.generate("Who appoints judges?").await.unwrap(),
            "  The president, with Senate consent. "
        );
        assert_eq!(
            ChatBridge::ready(Arc::new(client)).ask("Who appoints judges?").await,
            "The president, with Senate consent."
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let mut cfg = config();
        cfg.base_url = "http://127.0.0.1:1".to_string();
        cfg.timeout_secs = Some(2);
        let client = GeminiClient::with_key(Some("secret".to_string()), &cfg).unwrap();

        assert!(client.generate("hello").await.is_err());
    }
}
