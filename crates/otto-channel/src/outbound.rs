use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

/// Provider error code reported for an invalid or expired OAuth token.
const INVALID_OAUTH_ERROR_CODE: i64 = 190;

/// Credentials for one outbound route: the bearer token plus the sender
/// identity the provider scopes it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCredentials {
    pub access_token: String,
    pub sender_id: String,
}

/// Outbound message shapes the provider accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    Text { body: String },
    Image { link: String, caption: Option<String> },
}

impl OutboundPayload {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Builds the provider request body for `recipient`.
    pub fn to_request_body(&self, recipient: &str) -> Value {
        match self {
            Self::Text { body } => json!({
                "messaging_product": "whatsapp",
                "to": recipient,
                "type": "text",
                "text": { "body": body },
            }),
            Self::Image { link, caption } => json!({
                "messaging_product": "whatsapp",
                "to": recipient,
                "type": "image",
                "image": {
                    "link": link,
                    "caption": caption.as_deref().unwrap_or(""),
                },
            }),
        }
    }

    /// Text rendered into the durable attempt record for this payload.
    pub fn record_body(&self) -> String {
        match self {
            Self::Text { body } => body.clone(),
            Self::Image { link, caption } => match caption.as_deref() {
                Some(caption) if !caption.is_empty() => format!("[image] {link} ({caption})"),
                _ => format!("[image] {link}"),
            },
        }
    }
}

/// Successful provider response for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReceipt {
    pub http_status: u16,
    pub body: Value,
    pub provider_message_id: Option<String>,
}

/// Structured delivery failure with a stable reason code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelError {
    pub reason_code: String,
    pub detail: String,
    pub retryable: bool,
    pub http_status: Option<u16>,
}

impl ChannelError {
    /// True for the provider's invalid/expired-token failure class, which
    /// triggers the delivery engine's platform-credential fallback.
    pub fn is_invalid_credential(&self) -> bool {
        self.reason_code == "delivery_invalid_access_token"
    }
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (retryable={}, http_status={:?}): {}",
            self.reason_code, self.retryable, self.http_status, self.detail
        )
    }
}

impl std::error::Error for ChannelError {}

/// Narrow outbound contract the delivery engine depends on.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        payload: &OutboundPayload,
        credentials: &ChannelCredentials,
    ) -> Result<ChannelReceipt, ChannelError>;
}

/// Reqwest-backed transport for the Graph-style cloud messaging API.
pub struct CloudApiTransport {
    client: reqwest::Client,
    api_base: String,
}

impl CloudApiTransport {
    pub fn new(api_base: impl Into<String>, http_timeout_ms: u64) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(http_timeout_ms.max(1)))
            .build()
            .map_err(|error| ChannelError {
                reason_code: "delivery_client_init_failed".to_string(),
                detail: error.to_string(),
                retryable: false,
                http_status: None,
            })?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn messages_endpoint(&self, sender_id: &str) -> String {
        format!("{}/{}/messages", self.api_base, sender_id)
    }
}

#[async_trait]
impl ChannelTransport for CloudApiTransport {
    async fn send(
        &self,
        recipient: &str,
        payload: &OutboundPayload,
        credentials: &ChannelCredentials,
    ) -> Result<ChannelReceipt, ChannelError> {
        let endpoint = self.messages_endpoint(&credentials.sender_id);
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(credentials.access_token.trim())
            .json(&payload.to_request_body(recipient))
            .send()
            .await
            .map_err(|error| ChannelError {
                reason_code: "delivery_transport_error".to_string(),
                detail: error.to_string(),
                retryable: true,
                http_status: None,
            })?;

        let status = response.status().as_u16();
        let raw = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&raw).unwrap_or(Value::Null);

        if (200..300).contains(&status) {
            let provider_message_id = body["messages"][0]["id"]
                .as_str()
                .map(|value| value.to_string());
            tracing::debug!(recipient, status, "outbound message accepted by provider");
            return Ok(ChannelReceipt {
                http_status: status,
                body,
                provider_message_id,
            });
        }

        Err(classify_provider_failure(status, &body, &raw))
    }
}

/// Maps a non-success provider response onto a stable failure class.
///
/// The invalid-token signature is status 401, provider error code 190, or an
/// "invalid oauth access token" message.
pub fn classify_provider_failure(status: u16, body: &Value, raw: &str) -> ChannelError {
    let error_code = body["error"]["code"].as_i64();
    let error_message = body["error"]["message"].as_str().unwrap_or_default();

    let invalid_token = status == 401
        || error_code == Some(INVALID_OAUTH_ERROR_CODE)
        || error_message
            .to_lowercase()
            .contains("invalid oauth access token");
    if invalid_token {
        return ChannelError {
            reason_code: "delivery_invalid_access_token".to_string(),
            detail: render_failure_detail(error_message, raw),
            retryable: false,
            http_status: Some(status),
        };
    }

    ChannelError {
        reason_code: "delivery_provider_error".to_string(),
        detail: render_failure_detail(error_message, raw),
        retryable: status == 429 || status >= 500,
        http_status: Some(status),
    }
}

fn render_failure_detail(error_message: &str, raw: &str) -> String {
    if !error_message.is_empty() {
        return error_message.to_string();
    }
    if raw.trim().is_empty() {
        return "provider returned an empty error body".to_string();
    }
    raw.trim().to_string()
}
