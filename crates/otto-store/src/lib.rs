//! Durable store abstractions for the otto pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

mod sqlite;

pub use otto_types::{
    Contact, ConversationMessage, DeliveryAttempt, DeliveryStatus, NewConversationMessage,
    NewDeliveryAttempt, Template, Tenant, TrainingEntry,
};
pub use sqlite::SqlitePipelineStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tenant with routing key '{0}' already exists")]
    RoutingKeyAlreadyExists(String),
    #[error("delivery attempt '{0}' not found")]
    AttemptNotFound(String),
    #[error("invalid delivery status transition: {from:?} -> {to:?}")]
    InvalidDeliveryTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Async store contract used by the pipeline components.
///
/// Absence is expressed through `Option`/empty vectors, never as an error;
/// errors mean the store itself misbehaved and callers decide how to degrade.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Exact routing-key lookup. Returns the row regardless of its active
    /// flag; activation policy belongs to the tenant directory.
    async fn find_tenant_by_routing_key(&self, routing_key: &str) -> StoreResult<Option<Tenant>>;

    /// Active templates for a tenant, default-first then insertion order.
    async fn load_active_templates(&self, tenant_id: &str) -> StoreResult<Vec<Template>>;

    /// Active training entries for a tenant, priority descending then
    /// confidence descending.
    async fn load_active_training_entries(
        &self,
        tenant_id: &str,
    ) -> StoreResult<Vec<TrainingEntry>>;

    /// Looks up a contact by phone, creating it on first sight.
    async fn find_or_create_contact(
        &self,
        phone: &str,
        display_name: &str,
    ) -> StoreResult<Contact>;

    /// True when an inbound message with this external id is already in the
    /// ledger. This is the pipeline's idempotency boundary.
    async fn inbound_already_recorded(&self, external_message_id: &str) -> StoreResult<bool>;

    /// Appends one conversation ledger row. Ledger rows are write-once.
    async fn append_message(&self, message: NewConversationMessage) -> StoreResult<()>;

    /// Most recent ledger rows for one contact, newest first. Audit surface.
    async fn list_messages_for_contact(
        &self,
        contact: &str,
        limit: u32,
    ) -> StoreResult<Vec<ConversationMessage>>;

    /// Records the terminal outcome of one delivery call.
    async fn record_delivery_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> StoreResult<DeliveryAttempt>;

    /// Failed attempts eligible for a retry sweep: status `failed`,
    /// `retry_count < max_retries`, created within `window` of `now`.
    /// Oldest first.
    async fn list_retryable_attempts(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        max_retries: u32,
    ) -> StoreResult<Vec<DeliveryAttempt>>;

    /// Marks a swept attempt as successfully resent.
    async fn mark_attempt_resent(&self, attempt_id: &str, retry_count: u32) -> StoreResult<()>;

    /// Records a failed resend: bumps the retry count and either leaves the
    /// attempt `failed` for the next sweep or parks it as
    /// `permanent_failure`.
    async fn mark_attempt_retry_failed(
        &self,
        attempt_id: &str,
        retry_count: u32,
        permanent: bool,
        error_detail: &str,
    ) -> StoreResult<()>;

    async fn get_attempt(&self, attempt_id: &str) -> StoreResult<Option<DeliveryAttempt>>;

    /// Provisioning writes used by operator tooling and tests.
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<()>;
    async fn insert_template(&self, template: Template) -> StoreResult<()>;
    async fn insert_training_entry(&self, entry: TrainingEntry) -> StoreResult<()>;
}
