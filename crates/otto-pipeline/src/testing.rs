//! Scripted fakes shared by the pipeline unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use otto_ai::{CompletionRequest, GenerationBackend, GenerationError};
use otto_channel::{
    ChannelCredentials, ChannelError, ChannelReceipt, ChannelTransport, OutboundPayload,
};
use otto_store::{PipelineStore, StoreError, StoreResult};
use otto_types::{
    Contact, ConversationMessage, DeliveryAttempt, DeliveryStatus, NewConversationMessage,
    NewDeliveryAttempt, Template, Tenant, TrainingEntry,
};
use serde_json::json;

use crate::backends::BackendProvisioner;
use crate::context::GenerationCredentials;

pub fn receipt(http_status: u16) -> ChannelReceipt {
    ChannelReceipt {
        http_status,
        body: json!({ "messages": [ { "id": "wamid.out.test" } ] }),
        provider_message_id: Some("wamid.out.test".to_string()),
    }
}

pub fn invalid_token_error() -> ChannelError {
    ChannelError {
        reason_code: "delivery_invalid_access_token".to_string(),
        detail: "Invalid OAuth access token".to_string(),
        retryable: false,
        http_status: Some(401),
    }
}

pub fn provider_error(http_status: u16) -> ChannelError {
    ChannelError {
        reason_code: "delivery_provider_error".to_string(),
        detail: format!("provider returned status {http_status}"),
        retryable: http_status == 429 || http_status >= 500,
        http_status: Some(http_status),
    }
}

fn injected_failure(surface: &'static str) -> StoreError {
    StoreError::InvalidPersistedValue {
        field: surface,
        value: "injected test failure".to_string(),
    }
}

/// In-memory `PipelineStore` with failure injection.
#[derive(Default)]
pub struct FakeStore {
    tenants: Mutex<Vec<Tenant>>,
    templates: Mutex<Vec<Template>>,
    training_entries: Mutex<Vec<TrainingEntry>>,
    contacts: Mutex<Vec<Contact>>,
    messages: Mutex<Vec<NewConversationMessage>>,
    attempts: Mutex<Vec<DeliveryAttempt>>,
    pinned_created_at: Mutex<Option<DateTime<Utc>>>,
    fail_tenant_lookup: AtomicBool,
    fail_knowledge: AtomicBool,
    next_id: AtomicU64,
}

impl FakeStore {
    pub fn put_tenant(&self, tenant: Tenant) {
        self.tenants.lock().expect("tenants lock").push(tenant);
    }

    pub fn put_template(&self, template: Template) {
        self.templates.lock().expect("templates lock").push(template);
    }

    pub fn put_training_entry(&self, entry: TrainingEntry) {
        self.training_entries
            .lock()
            .expect("training entries lock")
            .push(entry);
    }

    pub fn fail_tenant_lookups(&self) {
        self.fail_tenant_lookup.store(true, Ordering::Relaxed);
    }

    pub fn fail_knowledge_loads(&self) {
        self.fail_knowledge.store(true, Ordering::Relaxed);
    }

    pub fn pin_created_at(&self, instant: DateTime<Utc>) {
        *self.pinned_created_at.lock().expect("pin lock") = Some(instant);
    }

    pub fn recorded_messages(&self) -> Vec<NewConversationMessage> {
        self.messages.lock().expect("messages lock").clone()
    }

    pub fn recorded_attempts(&self) -> Vec<DeliveryAttempt> {
        self.attempts.lock().expect("attempts lock").clone()
    }

    pub fn attempt(&self, attempt_id: &str) -> Option<DeliveryAttempt> {
        self.attempts
            .lock()
            .expect("attempts lock")
            .iter()
            .find(|attempt| attempt.attempt_id == attempt_id)
            .cloned()
    }

    /// Inserts a pre-existing attempt row with an explicit retry count, as
    /// the sweep tests need rows mid-lifecycle.
    pub fn seed_attempt(&self, attempt: NewDeliveryAttempt, retry_count: u32) -> DeliveryAttempt {
        let record = self.build_attempt(attempt, retry_count);
        self.attempts
            .lock()
            .expect("attempts lock")
            .push(record.clone());
        record
    }

    fn build_attempt(&self, attempt: NewDeliveryAttempt, retry_count: u32) -> DeliveryAttempt {
        let now = self
            .pinned_created_at
            .lock()
            .expect("pin lock")
            .unwrap_or_else(Utc::now);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        DeliveryAttempt {
            attempt_id: format!("attempt-test-{id}"),
            recipient: attempt.recipient,
            body: attempt.body,
            status: attempt.status,
            retry_count,
            response_status: attempt.response_status,
            response_body: attempt.response_body,
            error_detail: attempt.error_detail,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl PipelineStore for FakeStore {
    async fn find_tenant_by_routing_key(&self, routing_key: &str) -> StoreResult<Option<Tenant>> {
        if self.fail_tenant_lookup.load(Ordering::Relaxed) {
            return Err(injected_failure("tenant_lookup"));
        }
        Ok(self
            .tenants
            .lock()
            .expect("tenants lock")
            .iter()
            .find(|tenant| tenant.routing_key == routing_key)
            .cloned())
    }

    async fn load_active_templates(&self, tenant_id: &str) -> StoreResult<Vec<Template>> {
        if self.fail_knowledge.load(Ordering::Relaxed) {
            return Err(injected_failure("templates"));
        }
        let mut templates: Vec<Template> = self
            .templates
            .lock()
            .expect("templates lock")
            .iter()
            .filter(|template| template.tenant_id == tenant_id && template.is_active)
            .cloned()
            .collect();
        templates.sort_by_key(|template| (!template.is_default, template.created_at));
        Ok(templates)
    }

    async fn load_active_training_entries(
        &self,
        tenant_id: &str,
    ) -> StoreResult<Vec<TrainingEntry>> {
        if self.fail_knowledge.load(Ordering::Relaxed) {
            return Err(injected_failure("training_entries"));
        }
        let mut entries: Vec<TrainingEntry> = self
            .training_entries
            .lock()
            .expect("training entries lock")
            .iter()
            .filter(|entry| entry.tenant_id == tenant_id && entry.is_active)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.confidence.total_cmp(&a.confidence))
        });
        Ok(entries)
    }

    async fn find_or_create_contact(
        &self,
        phone: &str,
        display_name: &str,
    ) -> StoreResult<Contact> {
        let mut contacts = self.contacts.lock().expect("contacts lock");
        if let Some(existing) = contacts.iter().find(|contact| contact.phone == phone) {
            return Ok(existing.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let contact = Contact {
            contact_id: format!("contact-test-{id}"),
            phone: phone.to_string(),
            display_name: display_name.to_string(),
            created_at: Utc::now(),
        };
        contacts.push(contact.clone());
        Ok(contact)
    }

    async fn inbound_already_recorded(&self, external_message_id: &str) -> StoreResult<bool> {
        Ok(self
            .messages
            .lock()
            .expect("messages lock")
            .iter()
            .any(|message| message.external_message_id.as_deref() == Some(external_message_id)))
    }

    async fn append_message(&self, message: NewConversationMessage) -> StoreResult<()> {
        self.messages.lock().expect("messages lock").push(message);
        Ok(())
    }

    async fn list_messages_for_contact(
        &self,
        contact: &str,
        limit: u32,
    ) -> StoreResult<Vec<ConversationMessage>> {
        let messages = self.messages.lock().expect("messages lock");
        Ok(messages
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, message)| message.contact == contact)
            .take(limit as usize)
            .map(|(index, message)| ConversationMessage {
                message_id: index as i64 + 1,
                tenant_id: message.tenant_id.clone(),
                contact: message.contact.clone(),
                direction: message.direction,
                body: message.body.clone(),
                external_message_id: message.external_message_id.clone(),
                raw_payload: message.raw_payload.clone(),
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn record_delivery_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> StoreResult<DeliveryAttempt> {
        let record = self.build_attempt(attempt, 0);
        self.attempts
            .lock()
            .expect("attempts lock")
            .push(record.clone());
        Ok(record)
    }

    async fn list_retryable_attempts(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        max_retries: u32,
    ) -> StoreResult<Vec<DeliveryAttempt>> {
        let cutoff = now - window;
        let mut attempts: Vec<DeliveryAttempt> = self
            .attempts
            .lock()
            .expect("attempts lock")
            .iter()
            .filter(|attempt| {
                attempt.status == DeliveryStatus::Failed
                    && attempt.retry_count < max_retries
                    && attempt.created_at >= cutoff
            })
            .cloned()
            .collect();
        attempts.sort_by_key(|attempt| attempt.created_at);
        Ok(attempts)
    }

    async fn mark_attempt_resent(&self, attempt_id: &str, retry_count: u32) -> StoreResult<()> {
        self.transition(attempt_id, DeliveryStatus::Resent, retry_count, None)
    }

    async fn mark_attempt_retry_failed(
        &self,
        attempt_id: &str,
        retry_count: u32,
        permanent: bool,
        error_detail: &str,
    ) -> StoreResult<()> {
        let target = if permanent {
            DeliveryStatus::PermanentFailure
        } else {
            DeliveryStatus::Failed
        };
        self.transition(attempt_id, target, retry_count, Some(error_detail))
    }

    async fn get_attempt(&self, attempt_id: &str) -> StoreResult<Option<DeliveryAttempt>> {
        Ok(self.attempt(attempt_id))
    }

    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<()> {
        self.put_tenant(tenant);
        Ok(())
    }

    async fn insert_template(&self, template: Template) -> StoreResult<()> {
        self.put_template(template);
        Ok(())
    }

    async fn insert_training_entry(&self, entry: TrainingEntry) -> StoreResult<()> {
        self.put_training_entry(entry);
        Ok(())
    }
}

impl FakeStore {
    fn transition(
        &self,
        attempt_id: &str,
        target: DeliveryStatus,
        retry_count: u32,
        error_detail: Option<&str>,
    ) -> StoreResult<()> {
        let mut attempts = self.attempts.lock().expect("attempts lock");
        let Some(attempt) = attempts
            .iter_mut()
            .find(|attempt| attempt.attempt_id == attempt_id)
        else {
            return Err(StoreError::AttemptNotFound(attempt_id.to_string()));
        };
        if !attempt.status.can_transition_to(target) {
            return Err(StoreError::InvalidDeliveryTransition {
                from: attempt.status,
                to: target,
            });
        }
        attempt.status = target;
        attempt.retry_count = retry_count;
        if let Some(detail) = error_detail {
            attempt.error_detail = Some(detail.to_string());
        }
        attempt.updated_at = Utc::now();
        Ok(())
    }
}

/// Scripted channel transport recording every send.
pub struct FakeTransport {
    script: Mutex<VecDeque<Result<ChannelReceipt, ChannelError>>>,
    sends: Mutex<Vec<(String, String, String)>>,
}

impl FakeTransport {
    pub fn scripted(outcomes: Vec<Result<ChannelReceipt, ChannelError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            sends: Mutex::new(Vec::new()),
        }
    }

    /// Access tokens used for each send, in order.
    pub fn sent_tokens(&self) -> Vec<String> {
        self.sends
            .lock()
            .expect("sends lock")
            .iter()
            .map(|(_, _, token)| token.clone())
            .collect()
    }
}

#[async_trait]
impl ChannelTransport for FakeTransport {
    async fn send(
        &self,
        recipient: &str,
        payload: &OutboundPayload,
        credentials: &ChannelCredentials,
    ) -> Result<ChannelReceipt, ChannelError> {
        self.sends.lock().expect("sends lock").push((
            recipient.to_string(),
            payload.record_body(),
            credentials.access_token.clone(),
        ));
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ChannelError {
                    reason_code: "delivery_unscripted_send".to_string(),
                    detail: "fake transport script exhausted".to_string(),
                    retryable: false,
                    http_status: None,
                })
            })
    }
}

enum FakeBackendBehavior {
    Reply(String),
    Fail,
}

/// Generation backend with a fixed scripted behavior and call capture.
pub struct FakeBackend {
    name: String,
    behavior: FakeBackendBehavior,
    calls: AtomicU64,
    last_instruction: Mutex<Option<String>>,
}

impl FakeBackend {
    pub fn succeeding(name: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior: FakeBackendBehavior::Reply(reply.to_string()),
            calls: AtomicU64::new(0),
            last_instruction: Mutex::new(None),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior: FakeBackendBehavior::Fail,
            calls: AtomicU64::new(0),
            last_instruction: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn last_instruction(&self) -> Option<String> {
        self.last_instruction
            .lock()
            .expect("instruction lock")
            .clone()
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        *self.last_instruction.lock().expect("instruction lock") =
            Some(request.system_instruction.clone());
        match &self.behavior {
            FakeBackendBehavior::Reply(reply) => Ok(reply.clone()),
            FakeBackendBehavior::Fail => Err(GenerationError::HttpStatus {
                status: 500,
                body: "scripted failure".to_string(),
            }),
        }
    }
}

/// Provisioner returning a fixed chain and recording the credentials it was
/// asked to provision for.
pub struct FakeProvisioner {
    chain: Vec<Arc<dyn GenerationBackend>>,
    last_credentials: Mutex<Option<GenerationCredentials>>,
}

impl FakeProvisioner {
    pub fn new(backends: Vec<Arc<FakeBackend>>) -> Self {
        Self {
            chain: backends
                .into_iter()
                .map(|backend| backend as Arc<dyn GenerationBackend>)
                .collect(),
            last_credentials: Mutex::new(None),
        }
    }

    pub fn last_credentials(&self) -> Option<GenerationCredentials> {
        self.last_credentials
            .lock()
            .expect("credentials lock")
            .clone()
    }
}

impl BackendProvisioner for FakeProvisioner {
    fn chain_for(&self, credentials: &GenerationCredentials) -> Vec<Arc<dyn GenerationBackend>> {
        *self.last_credentials.lock().expect("credentials lock") = Some(credentials.clone());
        self.chain.clone()
    }
}
