use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use otto_ai::{CompletionRequest, GenerationBackend, GenerationError};
use otto_channel::{
    ChannelCredentials, ChannelError, ChannelReceipt, ChannelTransport, OutboundPayload,
};
use otto_core::Clock;
use otto_pipeline::{
    BackendProvisioner, DeliveryEngine, GenerationCredentials, InboundMessage, Pipeline,
    PipelineMetrics, PlatformDefaults, ReplyComposer, ReplySource, RetryPolicy, RetrySweeper,
    TenantDirectory, DEFAULT_SYSTEM_INSTRUCTION, STATIC_FALLBACK_REPLY,
};
use otto_pipeline::KnowledgeLoader;
use otto_store::{PipelineStore, SqlitePipelineStore};
use otto_types::{
    DeliveryStatus, MessageDirection, NewDeliveryAttempt, Template, Tenant, TrainingEntry,
    TrainingEntryKind,
};
use serde_json::json;
use tempfile::TempDir;

struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ChannelReceipt, ChannelError>>>,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(outcomes: Vec<Result<ChannelReceipt, ChannelError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            tokens: Mutex::new(Vec::new()),
        })
    }

    fn tokens(&self) -> Vec<String> {
        self.tokens.lock().expect("tokens lock").clone()
    }
}

#[async_trait]
impl ChannelTransport for ScriptedTransport {
    async fn send(
        &self,
        _recipient: &str,
        _payload: &OutboundPayload,
        credentials: &ChannelCredentials,
    ) -> Result<ChannelReceipt, ChannelError> {
        self.tokens
            .lock()
            .expect("tokens lock")
            .push(credentials.access_token.clone());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ChannelError {
                    reason_code: "delivery_unscripted_send".to_string(),
                    detail: "scripted transport exhausted".to_string(),
                    retryable: false,
                    http_status: None,
                })
            })
    }
}

struct ScriptedBackend {
    name: String,
    reply: Option<String>,
    calls: AtomicU64,
    instructions: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn succeeding(name: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply: Some(reply.to_string()),
            calls: AtomicU64::new(0),
            instructions: Mutex::new(Vec::new()),
        })
    }

    fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply: None,
            calls: AtomicU64::new(0),
            instructions: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn instructions(&self) -> Vec<String> {
        self.instructions.lock().expect("instructions lock").clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.instructions
            .lock()
            .expect("instructions lock")
            .push(request.system_instruction.clone());
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(GenerationError::HttpStatus {
                status: 500,
                body: "scripted failure".to_string(),
            }),
        }
    }
}

struct FixedProvisioner {
    chain: Vec<Arc<dyn GenerationBackend>>,
}

impl FixedProvisioner {
    fn new(backends: Vec<Arc<ScriptedBackend>>) -> Arc<Self> {
        Arc::new(Self {
            chain: backends
                .into_iter()
                .map(|backend| backend as Arc<dyn GenerationBackend>)
                .collect(),
        })
    }
}

impl BackendProvisioner for FixedProvisioner {
    fn chain_for(&self, _credentials: &GenerationCredentials) -> Vec<Arc<dyn GenerationBackend>> {
        self.chain.clone()
    }
}

fn receipt(http_status: u16) -> ChannelReceipt {
    ChannelReceipt {
        http_status,
        body: json!({ "messages": [ { "id": "wamid.out.1" } ] }),
        provider_message_id: Some("wamid.out.1".to_string()),
    }
}

fn invalid_token_error() -> ChannelError {
    ChannelError {
        reason_code: "delivery_invalid_access_token".to_string(),
        detail: "Invalid OAuth access token".to_string(),
        retryable: false,
        http_status: Some(401),
    }
}

fn provider_error(status: u16) -> ChannelError {
    ChannelError {
        reason_code: "delivery_provider_error".to_string(),
        detail: format!("provider returned status {status}"),
        retryable: true,
        http_status: Some(status),
    }
}

fn defaults() -> PlatformDefaults {
    PlatformDefaults {
        generation_provider: "openai".to_string(),
        generation_model: "gpt-4o-mini".to_string(),
        generation_api_key: "platform-key".to_string(),
        channel: ChannelCredentials {
            access_token: "platform-token".to_string(),
            sender_id: "1000".to_string(),
        },
    }
}

struct Harness {
    _workspace: TempDir,
    store: Arc<dyn PipelineStore>,
    metrics: Arc<PipelineMetrics>,
    engine: Arc<DeliveryEngine>,
    pipeline: Pipeline,
}

fn harness(
    transport: Arc<ScriptedTransport>,
    provisioner: Arc<FixedProvisioner>,
) -> Harness {
    let workspace = TempDir::new().expect("create workspace");
    let store: Arc<dyn PipelineStore> = Arc::new(
        SqlitePipelineStore::new(workspace.path().join("otto.sqlite")).expect("create store"),
    );
    let metrics = Arc::new(PipelineMetrics::new());
    let engine = Arc::new(DeliveryEngine::new(
        transport,
        store.clone(),
        defaults().channel,
        metrics.clone(),
    ));
    let pipeline = Pipeline::new(
        store.clone(),
        TenantDirectory::new(store.clone()),
        KnowledgeLoader::new(store.clone()),
        ReplyComposer::new(metrics.clone()),
        engine.clone(),
        provisioner,
        defaults(),
    );
    Harness {
        _workspace: workspace,
        store,
        metrics,
        engine,
        pipeline,
    }
}

async fn seed_acme(store: &Arc<dyn PipelineStore>, channel_token: Option<&str>) {
    let now = Utc::now();
    store
        .insert_tenant(Tenant {
            tenant_id: "acme".to_string(),
            routing_key: "254700000001".to_string(),
            display_name: "Acme".to_string(),
            brand_ref: Some("brand-acme".to_string()),
            is_active: true,
            is_verified: true,
            escalation_contact: Some("ops@acme.example".to_string()),
            generation_provider: None,
            generation_model: None,
            generation_api_key: None,
            channel_access_token: channel_token.map(str::to_string),
            channel_sender_id: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("insert tenant");
    store
        .insert_template(Template {
            template_id: "tpl-acme".to_string(),
            tenant_id: "acme".to_string(),
            label: "default".to_string(),
            system_instruction: "Acme bot".to_string(),
            is_default: true,
            is_active: true,
            created_at: now,
        })
        .await
        .expect("insert template");
    store
        .insert_training_entry(TrainingEntry {
            entry_id: "faq-hours".to_string(),
            tenant_id: "acme".to_string(),
            kind: TrainingEntryKind::Faq,
            question: Some("hours?".to_string()),
            answer: Some("9-5".to_string()),
            category: Some("general".to_string()),
            priority: 10,
            confidence: 0.9,
            is_active: true,
            created_at: now,
        })
        .await
        .expect("insert entry");
}

fn inbound(sender: &str, text: &str, external_id: &str) -> InboundMessage {
    InboundMessage {
        sender: sender.to_string(),
        sender_name: Some("Jordan".to_string()),
        text: text.to_string(),
        external_message_id: external_id.to_string(),
        raw_payload: Some(json!({ "text": { "body": text } })),
    }
}

#[tokio::test]
async fn scenario_tenant_faq_answers_without_generation() {
    let backend = ScriptedBackend::succeeding("primary", "generated");
    let transport = ScriptedTransport::new(vec![Ok(receipt(200))]);
    let harness = harness(transport, FixedProvisioner::new(vec![backend.clone()]));
    seed_acme(&harness.store, None).await;

    let outcome = harness
        .pipeline
        .handle_inbound(inbound("254700000001", "what are your hours?", "wamid.1"))
        .await;

    assert_eq!(outcome.reply, "9-5");
    assert_eq!(
        outcome.source,
        ReplySource::Faq {
            entry_id: "faq-hours".to_string()
        }
    );
    assert!(outcome.delivered);
    assert_eq!(backend.calls(), 0);
    assert_eq!(harness.metrics.snapshot().errors_total(), 0);

    let history = harness
        .store
        .list_messages_for_contact("254700000001", 10)
        .await
        .expect("read ledger");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].direction, MessageDirection::Outbound);
    assert_eq!(history[0].body, "9-5");
    assert_eq!(history[1].direction, MessageDirection::Inbound);
    assert_eq!(history[1].external_message_id.as_deref(), Some("wamid.1"));
}

#[tokio::test]
async fn scenario_unknown_routing_key_uses_default_instruction_and_chain() {
    let backend = ScriptedBackend::succeeding("primary", "generated reply");
    let transport = ScriptedTransport::new(vec![Ok(receipt(200))]);
    let harness = harness(transport.clone(), FixedProvisioner::new(vec![backend.clone()]));

    let outcome = harness
        .pipeline
        .handle_inbound(inbound("999999999999", "hello", "wamid.2"))
        .await;

    assert_eq!(outcome.tenant_id, None);
    assert_eq!(outcome.reply, "generated reply");
    assert_eq!(backend.calls(), 1);
    assert_eq!(
        backend.instructions(),
        vec![DEFAULT_SYSTEM_INSTRUCTION.to_string()]
    );
    assert_eq!(transport.tokens(), vec!["platform-token".to_string()]);
}

#[tokio::test]
async fn scenario_exhausted_chain_sends_the_static_fallback() {
    let backends = vec![
        ScriptedBackend::failing("primary"),
        ScriptedBackend::failing("openrouter"),
        ScriptedBackend::failing("huggingface"),
    ];
    let transport = ScriptedTransport::new(vec![Ok(receipt(200))]);
    let harness = harness(transport, FixedProvisioner::new(backends.clone()));

    let outcome = harness
        .pipeline
        .handle_inbound(inbound("999999999999", "hello", "wamid.3"))
        .await;

    assert_eq!(outcome.reply, STATIC_FALLBACK_REPLY);
    assert_eq!(outcome.source, ReplySource::StaticFallback);
    assert!(outcome.delivered);
    for backend in &backends {
        assert_eq!(backend.calls(), 1);
    }
    assert_eq!(harness.metrics.snapshot().generation_failures, 3);
}

#[tokio::test]
async fn scenario_broken_tenant_token_falls_back_to_platform_credentials() {
    let backend = ScriptedBackend::succeeding("primary", "generated");
    let transport = ScriptedTransport::new(vec![Err(invalid_token_error()), Ok(receipt(200))]);
    let harness = harness(transport.clone(), FixedProvisioner::new(vec![backend]));
    seed_acme(&harness.store, Some("acme-token")).await;

    let outcome = harness
        .pipeline
        .handle_inbound(inbound("254700000001", "do you deliver?", "wamid.4"))
        .await;

    assert!(outcome.delivered);
    assert_eq!(
        transport.tokens(),
        vec!["acme-token".to_string(), "platform-token".to_string()]
    );
}

#[tokio::test]
async fn scenario_failed_delivery_survives_two_sweeps_then_resends() {
    let transport = ScriptedTransport::new(vec![
        Err(provider_error(503)), // original delivery
        Err(provider_error(503)), // sweep 1
        Err(provider_error(503)), // sweep 2
        Ok(receipt(200)),         // sweep 3
    ]);
    let harness = harness(transport, FixedProvisioner::new(vec![]));

    let delivered = harness
        .engine
        .deliver("254700000001", &OutboundPayload::text("hello"), None)
        .await;
    assert!(!delivered);

    let sweeper = RetrySweeper::new(
        harness.store.clone(),
        harness.engine.clone(),
        RetryPolicy::default(),
        Arc::new(Utc::now) as Clock,
    );

    let first = sweeper.run_sweep().await;
    assert_eq!(first.still_failed, 1);
    let second = sweeper.run_sweep().await;
    assert_eq!(second.still_failed, 1);
    let third = sweeper.run_sweep().await;
    assert_eq!(third.resent, 1);

    let attempts = harness
        .store
        .list_retryable_attempts(Utc::now(), chrono::Duration::hours(24), 3)
        .await
        .expect("list retryable");
    assert!(attempts.is_empty());
}

#[tokio::test]
async fn scenario_retries_exhaust_into_permanent_failure() {
    let transport = ScriptedTransport::new(vec![
        Err(provider_error(503)),
        Err(provider_error(503)),
        Err(provider_error(503)),
        Err(provider_error(503)),
    ]);
    let harness = harness(transport, FixedProvisioner::new(vec![]));

    assert!(
        !harness
            .engine
            .deliver("254700000001", &OutboundPayload::text("hello"), None)
            .await
    );

    let sweeper = RetrySweeper::new(
        harness.store.clone(),
        harness.engine.clone(),
        RetryPolicy::default(),
        Arc::new(Utc::now) as Clock,
    );
    assert_eq!(sweeper.run_sweep().await.still_failed, 1);
    assert_eq!(sweeper.run_sweep().await.still_failed, 1);
    assert_eq!(sweeper.run_sweep().await.exhausted, 1);

    // Nothing left to sweep once the attempt is parked.
    assert_eq!(sweeper.run_sweep().await.scanned, 0);
}

#[tokio::test]
async fn scenario_stale_failures_age_out_of_the_retry_window() {
    let workspace = TempDir::new().expect("create workspace");
    let stale_instant = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let store: Arc<dyn PipelineStore> = Arc::new(
        SqlitePipelineStore::with_clock(
            workspace.path().join("otto.sqlite"),
            Arc::new(move || stale_instant) as Clock,
        )
        .expect("create store"),
    );
    store
        .record_delivery_attempt(NewDeliveryAttempt {
            recipient: "254700000001".to_string(),
            body: "too old".to_string(),
            status: DeliveryStatus::Failed,
            response_status: None,
            response_body: None,
            error_detail: Some("timeout".to_string()),
        })
        .await
        .expect("record stale attempt");

    let transport = ScriptedTransport::new(vec![]);
    let metrics = Arc::new(PipelineMetrics::new());
    let engine = Arc::new(DeliveryEngine::new(
        transport.clone(),
        store.clone(),
        defaults().channel,
        metrics,
    ));
    let sweep_instant = stale_instant + chrono::Duration::hours(30);
    let sweeper = RetrySweeper::new(
        store,
        engine,
        RetryPolicy::default(),
        Arc::new(move || sweep_instant) as Clock,
    );

    let report = sweeper.run_sweep().await;
    assert_eq!(report.scanned, 0);
    assert!(transport.tokens().is_empty());
}
