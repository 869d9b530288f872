//! The inbound pipeline: one asynchronous unit of work per message, from
//! tenant resolution through reply delivery and ledger writes.

use std::sync::Arc;

use otto_channel::OutboundPayload;
use otto_store::PipelineStore;
use otto_types::{MessageDirection, NewConversationMessage};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backends::BackendProvisioner;
use crate::composer::{ComposedReply, ReplyComposer, ReplySource};
use crate::context::PlatformDefaults;
use crate::delivery::DeliveryEngine;
use crate::directory::TenantDirectory;
use crate::knowledge::KnowledgeLoader;

/// The narrow inbound contract: everything the pipeline needs from the
/// surrounding webhook transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: String,
    pub sender_name: Option<String>,
    pub text: String,
    pub external_message_id: String,
    pub raw_payload: Option<Value>,
}

/// What one pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub duplicate: bool,
    pub tenant_id: Option<String>,
    pub reply: String,
    pub source: ReplySource,
    pub delivered: bool,
}

/// Wires the pipeline components into the single inbound entry point.
pub struct Pipeline {
    store: Arc<dyn PipelineStore>,
    directory: TenantDirectory,
    knowledge: KnowledgeLoader,
    composer: ReplyComposer,
    engine: Arc<DeliveryEngine>,
    provisioner: Arc<dyn BackendProvisioner>,
    defaults: PlatformDefaults,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        directory: TenantDirectory,
        knowledge: KnowledgeLoader,
        composer: ReplyComposer,
        engine: Arc<DeliveryEngine>,
        provisioner: Arc<dyn BackendProvisioner>,
        defaults: PlatformDefaults,
    ) -> Self {
        Self {
            store,
            directory,
            knowledge,
            composer,
            engine,
            provisioner,
            defaults,
        }
    }

    /// Handles one inbound message to its terminal state. No internal error
    /// escapes: every stage degrades, and the sender always gets some reply
    /// unless the message is a duplicate.
    pub async fn handle_inbound(&self, message: InboundMessage) -> PipelineOutcome {
        info!(
            sender = %message.sender,
            external_message_id = %message.external_message_id,
            "inbound message received"
        );

        match self
            .store
            .inbound_already_recorded(&message.external_message_id)
            .await
        {
            Ok(true) => {
                debug!(
                    external_message_id = %message.external_message_id,
                    "duplicate inbound message, skipping"
                );
                return PipelineOutcome {
                    duplicate: true,
                    tenant_id: None,
                    reply: String::new(),
                    source: ReplySource::StaticFallback,
                    delivered: false,
                };
            }
            Ok(false) => {}
            Err(error) => {
                warn!(%error, "idempotency check failed, treating message as new");
            }
        }

        let display_name = message
            .sender_name
            .clone()
            .unwrap_or_else(|| message.sender.clone());
        if let Err(error) = self
            .store
            .find_or_create_contact(&message.sender, &display_name)
            .await
        {
            warn!(sender = %message.sender, %error, "contact upsert failed, continuing");
        }

        let context = self.directory.resolve(&message.sender).await;
        let tenant_id = context.tenant_id().map(str::to_string);
        let templates = self.knowledge.load_templates(context.tenant_id()).await;
        let training_data = self.knowledge.load_training_data(context.tenant_id()).await;
        debug!(
            tenant = context.label(),
            templates = templates.len(),
            training_entries = training_data.len(),
            "tenant knowledge loaded"
        );

        if let Err(error) = self
            .store
            .append_message(NewConversationMessage {
                tenant_id: tenant_id.clone(),
                contact: message.sender.clone(),
                direction: MessageDirection::Inbound,
                body: message.text.clone(),
                external_message_id: Some(message.external_message_id.clone()),
                raw_payload: message.raw_payload.clone(),
            })
            .await
        {
            warn!(%error, "could not append inbound ledger row, continuing");
        }

        let credentials = context.generation_credentials(&self.defaults);
        let backends = self.provisioner.chain_for(&credentials);
        let ComposedReply { text, source } = self
            .composer
            .compose(&message.text, &context, &templates, &training_data, &backends)
            .await;

        let delivered = self
            .engine
            .deliver(
                &message.sender,
                &OutboundPayload::text(text.clone()),
                context.tenant_channel_credentials(&self.defaults),
            )
            .await;

        if let Err(error) = self
            .store
            .append_message(NewConversationMessage {
                tenant_id: tenant_id.clone(),
                contact: message.sender.clone(),
                direction: MessageDirection::Outbound,
                body: text.clone(),
                external_message_id: None,
                raw_payload: None,
            })
            .await
        {
            warn!(%error, "could not append outbound ledger row");
        }

        PipelineOutcome {
            duplicate: false,
            tenant_id,
            reply: text,
            source,
            delivered,
        }
    }
}
