//! Shared data types for the otto message pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error returned when a status transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusTransitionError {
    #[error("invalid {kind} transition: {from:?} -> {to:?}")]
    Invalid {
        kind: &'static str,
        from: String,
        to: String,
    },
}

/// Durable outcome state for one outbound delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Resent,
    PermanentFailure,
}

impl DeliveryStatus {
    /// Returns true when this status can transition to `next`.
    ///
    /// `Failed` is the only live state: a sweep either resends it, exhausts
    /// it, or leaves it failed for the next sweep.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Self::Failed, Self::Resent) | (Self::Failed, Self::PermanentFailure)
        )
    }

    /// Returns an error if transitioning to `next` is not allowed.
    pub fn ensure_transition(self, next: Self) -> Result<(), StatusTransitionError> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        Err(StatusTransitionError::Invalid {
            kind: "delivery_status",
            from: format!("{self:?}"),
            to: format!("{next:?}"),
        })
    }

    /// Returns true when no further delivery work is expected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Resent | Self::PermanentFailure)
    }

    /// Returns true when the retry sweeper may pick this attempt up.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Resent => "resent",
            Self::PermanentFailure => "permanent_failure",
        }
    }
}

/// Direction of a conversation ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// Kind of a tenant training entry. Only `Faq` participates in
/// short-circuit matching; other kinds are stored for future use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingEntryKind {
    Faq,
    CannedReply,
}

impl TrainingEntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Faq => "faq",
            Self::CannedReply => "canned_reply",
        }
    }
}

/// One client business, keyed by the inbound routing identity.
///
/// Credential fields are individually optional; resolution against platform
/// defaults happens per field, so a tenant may override only its model or
/// only its channel token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub routing_key: String,
    pub display_name: String,
    pub brand_ref: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub escalation_contact: Option<String>,
    pub generation_provider: Option<String>,
    pub generation_model: Option<String>,
    pub generation_api_key: Option<String>,
    pub channel_access_token: Option<String>,
    pub channel_sender_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A system-instruction profile owned by one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub template_id: String,
    pub tenant_id: String,
    pub label: String,
    pub system_instruction: String,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A canned question/answer pair owned by one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingEntry {
    pub entry_id: String,
    pub tenant_id: String,
    pub kind: TrainingEntryKind,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub category: Option<String>,
    pub priority: i64,
    pub confidence: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A known end user, created on first inbound contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub contact_id: String,
    pub phone: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only conversation ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: i64,
    pub tenant_id: Option<String>,
    pub contact: String,
    pub direction: MessageDirection,
    pub body: String,
    pub external_message_id: Option<String>,
    pub raw_payload: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Write shape for a new conversation ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConversationMessage {
    pub tenant_id: Option<String>,
    pub contact: String,
    pub direction: MessageDirection,
    pub body: String,
    pub external_message_id: Option<String>,
    pub raw_payload: Option<Value>,
}

/// Durable record of one outbound send and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub attempt_id: String,
    pub recipient: String,
    pub body: String,
    pub status: DeliveryStatus,
    pub retry_count: u32,
    pub response_status: Option<u16>,
    pub response_body: Option<Value>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Write shape for a new delivery attempt record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDeliveryAttempt {
    pub recipient: String,
    pub body: String,
    pub status: DeliveryStatus,
    pub response_status: Option<u16>,
    pub response_body: Option<Value>,
    pub error_detail: Option<String>,
}
