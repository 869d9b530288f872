use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{CompletionRequest, GenerationBackend, GenerationError};

/// Public struct `ChatCompletionsConfig` describing one backend route.
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    pub backend_name: String,
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout_ms: u64,
}

/// OpenAI-compatible chat-completions client. All three production backends
/// are instances of this type with different routes.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    config: ChatCompletionsConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| {
                GenerationError::InvalidResponse(format!("invalid API key header: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }

        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl GenerationBackend for ChatCompletionsClient {
    fn name(&self) -> &str {
        &self.config.backend_name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        let body = build_request_body(request, &self.config.model);
        let response = self
            .client
            .post(self.chat_completions_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }

        parse_reply(&raw)
    }
}

fn build_request_body(request: &CompletionRequest, model: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system_instruction },
            { "role": "user", "content": request.user_text },
        ],
    })
}

fn parse_reply(raw: &str) -> Result<String, GenerationError> {
    let parsed: ChatCompletionsResponse = serde_json::from_str(raw)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("response contained no choices".to_string()))?;

    let reply = choice.message.content.unwrap_or_default();
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(GenerationError::EmptyReply);
    }

    Ok(reply.to_string())
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::{build_request_body, parse_reply, ChatCompletionsClient, ChatCompletionsConfig};
    use crate::{CompletionRequest, GenerationBackend, GenerationError};

    fn sample_request() -> CompletionRequest {
        CompletionRequest {
            system_instruction: "You are a support assistant.".to_string(),
            user_text: "when do you open?".to_string(),
        }
    }

    fn client_for(base: String) -> ChatCompletionsClient {
        ChatCompletionsClient::new(ChatCompletionsConfig {
            backend_name: "primary".to_string(),
            api_base: base,
            api_key: "test-key".to_string(),
            model: "gpt-4o-mini".to_string(),
            request_timeout_ms: 2_000,
        })
        .expect("client builds")
    }

    #[test]
    fn unit_request_body_carries_instruction_and_user_text() {
        let body = build_request_body(&sample_request(), "gpt-4o-mini");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a support assistant.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "when do you open?");
    }

    #[test]
    fn unit_missing_api_key_is_rejected_at_construction() {
        let error = ChatCompletionsClient::new(ChatCompletionsConfig {
            backend_name: "primary".to_string(),
            api_base: "https://api.example.test/v1".to_string(),
            api_key: "   ".to_string(),
            model: "gpt-4o-mini".to_string(),
            request_timeout_ms: 2_000,
        })
        .expect_err("blank key should fail");
        assert!(matches!(error, GenerationError::MissingApiKey));
    }

    #[test]
    fn parses_first_choice_content() {
        let raw = r#"{
            "choices": [
                { "message": { "content": "We open at 9am." } },
                { "message": { "content": "ignored" } }
            ]
        }"#;
        assert_eq!(parse_reply(raw).expect("reply parses"), "We open at 9am.");
    }

    #[test]
    fn unit_blank_content_is_an_empty_reply_error() {
        let raw = r#"{ "choices": [ { "message": { "content": "   " } } ] }"#;
        assert!(matches!(
            parse_reply(raw).expect_err("blank reply should fail"),
            GenerationError::EmptyReply
        ));

        let raw_null = r#"{ "choices": [ { "message": { "content": null } } ] }"#;
        assert!(matches!(
            parse_reply(raw_null).expect_err("null reply should fail"),
            GenerationError::EmptyReply
        ));
    }

    #[test]
    fn unit_missing_choices_is_an_invalid_response() {
        let raw = r#"{ "choices": [] }"#;
        assert!(matches!(
            parse_reply(raw).expect_err("no choices should fail"),
            GenerationError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn functional_complete_round_trips_through_the_provider() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .json_body_includes(r#"{ "model": "gpt-4o-mini" }"#);
                then.status(200).json_body(serde_json::json!({
                    "choices": [ { "message": { "content": "We open at 9am." } } ]
                }));
            })
            .await;

        let client = client_for(format!("{}/v1", server.base_url()));
        let reply = client
            .complete(&sample_request())
            .await
            .expect("completion succeeds");
        assert_eq!(reply, "We open at 9am.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn regression_provider_error_surfaces_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let client = client_for(format!("{}/v1", server.base_url()));
        let error = client
            .complete(&sample_request())
            .await
            .expect_err("provider error should surface");
        match error {
            GenerationError::HttpStatus { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
