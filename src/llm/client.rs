//! OpenAI-compatible chat completion client.
//!
//! Sends non-streaming completion requests with a JSON-object response
//! contract and maps the response into [`Completion`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;

use crate::llm::types::{Completion, CompletionRequest, Usage};
use crate::llm::{ChatProvider, ProviderError};

/// Client identifier sent to the upstream.
const USER_AGENT: &str = concat!("wayfare/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Response deserialization
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct OaiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<OaiChoice>,
    #[serde(default)]
    usage: Option<OaiUsage>,
}

#[derive(Debug, serde::Deserialize)]
struct OaiChoice {
    #[serde(default)]
    message: Option<OaiMessage>,
}

#[derive(Debug, serde::Deserialize)]
struct OaiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct OaiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Chat client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    base_url: String,
    client: Client,
}

impl OpenAiClient {
    /// Create a client against the given base URL (e.g.
    /// `https://api.openai.com/v1`).
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client with custom config, using defaults");
                Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn build_request_body(request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "response_format": { "type": "json_object" },
        })
    }

    async fn complete_inner(
        &self,
        credential: &str,
        request: &CompletionRequest,
    ) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_request_body(request);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(credential)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: raw,
            });
        }

        let parsed: OaiResponse = serde_json::from_str(&raw)
            .map_err(|e| ProviderError::Malformed(format!("response body: {e}")))?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .ok_or_else(|| ProviderError::Malformed("no message content in response".into()))?;

        // Fall back to the requested id when the upstream omits one, so cost
        // accounting always has a key.
        let model = if parsed.model.is_empty() {
            request.model.clone()
        } else {
            parsed.model
        };

        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(Completion {
            model,
            content,
            usage,
            raw,
        })
    }
}

impl ChatProvider for OpenAiClient {
    fn complete(
        &self,
        credential: &str,
        request: &CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + '_>> {
        let credential = credential.to_string();
        let request = request.clone();
        Box::pin(async move { self.complete_inner(&credential, &request).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                ChatMessage::system("You are a travel guide."),
                ChatMessage::user("8 spots near Lisbon"),
            ],
            temperature: 0.8,
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = OpenAiClient::build_request_body(&request());
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [
                    {"message": {"role": "assistant", "content": "{\"spots\":[]}"}}
                ],
                "usage": {"prompt_tokens": 321, "completion_tokens": 1234, "total_tokens": 1555}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), 5);
        let completion = client.complete("sk-test", &request()).await.unwrap();

        // The RETURNED model id is preserved, not the requested one.
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(completion.content, "{\"spots\":[]}");
        assert_eq!(completion.usage.prompt_tokens, 321);
        assert_eq!(completion.usage.completion_tokens, 1234);
        assert!(completion.raw.contains("chatcmpl-1"));
    }

    #[tokio::test]
    async fn test_complete_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), 5);
        let err = client.complete("sk-bad", &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_complete_missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "choices": []
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), 5);
        let err = client.complete("sk-test", &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_complete_falls_back_to_requested_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "{}"}}
                ]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), 5);
        let completion = client.complete("sk-test", &request()).await.unwrap();
        assert_eq!(completion.model, "gpt-4o-mini");
    }
}
