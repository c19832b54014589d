//! Chat-completions client for the LLM author tier.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use ingestkit_shared::{AppConfig, AuthorMode, IngestError, Result, llm_api_key};

const LLM_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl LlmClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Build a client from config. `None` when the credential env var is
    /// unset, which disables the LLM tier.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let api_key = llm_api_key(config)?;
        Some(Self::new(
            config.llm.endpoint.clone(),
            config.llm.model.clone(),
            api_key,
        ))
    }

    /// Ask the model for the author of a document.
    ///
    /// The content preview is capped at the mode's character budget and the
    /// completion at its token allowance. Returns `Ok(None)` when the model
    /// answers `Unknown` or with something that does not look like a name.
    #[instrument(skip_all, fields(title = %title, mode = %mode))]
    pub async fn extract_author(
        &self,
        title: &str,
        content: &str,
        mode: AuthorMode,
    ) -> Result<Option<String>> {
        let preview = truncate_chars(content, mode.char_budget());
        let prompt = format!(
            "Extract the author name(s) of this document.\n\n\
             Title: {title}\n\n\
             Content preview:\n{preview}\n\n\
             If there are multiple authors, list them separated by commas. \
             Respond only with the name(s). If no author can be determined, \
             respond with \"Unknown\"."
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: mode.max_tokens(),
            temperature: 0.0,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(LLM_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| IngestError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Llm(format!(
                "endpoint returned {status}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| IngestError::Llm(format!("malformed response: {e}")))?;

        let reply = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().trim_matches('"').trim())
            .unwrap_or_default();

        debug!(reply = %reply, "llm reply");

        if reply.is_empty() || !crate::is_plausible_name(reply) {
            return Ok(None);
        }
        Ok(Some(reply.to_string()))
    }
}

/// Truncate at a char boundary, never mid-codepoint.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_reply(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("\u{e9}\u{e9}\u{e9}", 2), "\u{e9}\u{e9}");
    }

    #[tokio::test]
    async fn extracts_author_from_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Jane Roe")))
            .mount(&server)
            .await;

        let client = LlmClient::new(
            format!("{}/v1/chat/completions", server.uri()),
            "test-model",
            "test-key",
        );
        let author = client
            .extract_author("A Post", "some body text", AuthorMode::Balanced)
            .await
            .unwrap();
        assert_eq!(author.as_deref(), Some("Jane Roe"));
    }

    #[tokio::test]
    async fn unknown_reply_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Unknown")))
            .mount(&server)
            .await;

        let client = LlmClient::new(server.uri(), "test-model", "test-key");
        let author = client
            .extract_author("A Post", "body", AuthorMode::Balanced)
            .await
            .unwrap();
        assert!(author.is_none());
    }

    #[tokio::test]
    async fn implausible_reply_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
                "I could not find an author for this document.",
            )))
            .mount(&server)
            .await;

        let client = LlmClient::new(server.uri(), "test-model", "test-key");
        let author = client
            .extract_author("A Post", "body", AuthorMode::Accuracy)
            .await
            .unwrap();
        assert!(author.is_none());
    }

    #[tokio::test]
    async fn server_error_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = LlmClient::new(server.uri(), "test-model", "test-key");
        let err = client
            .extract_author("A Post", "body", AuthorMode::Balanced)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Llm(_)));
    }

    #[tokio::test]
    async fn content_capped_at_mode_budget() {
        let server = MockServer::start().await;

        // A marker placed past the cost_saving budget must never reach the wire
        Mock::given(method("POST"))
            .and(body_string_contains("BUDGET_OVERRUN_MARKER"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Sam Chen")))
            .mount(&server)
            .await;

        let content = format!("{}BUDGET_OVERRUN_MARKER", "x".repeat(300));
        let client = LlmClient::new(server.uri(), "test-model", "test-key");
        let author = client
            .extract_author("A Post", &content, AuthorMode::CostSaving)
            .await
            .unwrap();
        assert_eq!(author.as_deref(), Some("Sam Chen"));
    }
}
