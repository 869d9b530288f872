//! Reply composition: template-derived instruction, FAQ short-circuit, and
//! the generation fallback chain.

use std::sync::Arc;

use otto_ai::{CompletionRequest, GenerationBackend};
use otto_types::{Template, TrainingEntry, TrainingEntryKind};
use tracing::{info, warn};

use crate::context::TenantContext;
use crate::metrics::PipelineMetrics;

/// Instruction used when a conversation has no active template.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful customer support \
assistant. Be professional, warm, and concise, and keep answers grounded in what \
the business actually offers.";

/// Terminal reply when every generation backend has failed. Composition must
/// always produce something, so this branch has no further fallback.
pub const STATIC_FALLBACK_REPLY: &str = "Thanks for reaching out! Our assistant is \
having trouble answering automatically right now, and a member of the team will \
follow up with you shortly.";

/// Where a composed reply came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySource {
    Faq { entry_id: String },
    Backend { name: String },
    StaticFallback,
}

impl ReplySource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Faq { .. } => "faq",
            Self::Backend { .. } => "backend",
            Self::StaticFallback => "static_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedReply {
    pub text: String,
    pub source: ReplySource,
}

/// Composes one reply per inbound message. Total from the caller's point of
/// view: every failure path degrades to the next chain stage or the static
/// fallback.
pub struct ReplyComposer {
    metrics: Arc<PipelineMetrics>,
}

impl ReplyComposer {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self { metrics }
    }

    pub async fn compose(
        &self,
        user_text: &str,
        context: &TenantContext,
        templates: &[Template],
        training_data: &[TrainingEntry],
        backends: &[Arc<dyn GenerationBackend>],
    ) -> ComposedReply {
        if let Some(entry) = match_training_entry(user_text, training_data) {
            info!(
                tenant = context.label(),
                entry_id = %entry.entry_id,
                category = entry.category.as_deref().unwrap_or("general"),
                "training data matched, skipping generation"
            );
            return ComposedReply {
                // Guarded by match_training_entry, which only matches
                // entries with an answer present.
                text: entry.answer.clone().unwrap_or_default(),
                source: ReplySource::Faq {
                    entry_id: entry.entry_id.clone(),
                },
            };
        }

        let request = CompletionRequest {
            system_instruction: system_instruction(templates).to_string(),
            user_text: user_text.to_string(),
        };

        for backend in backends {
            match backend.complete(&request).await {
                Ok(reply) if !reply.trim().is_empty() => {
                    info!(
                        tenant = context.label(),
                        backend = backend.name(),
                        "generated reply"
                    );
                    return ComposedReply {
                        text: reply,
                        source: ReplySource::Backend {
                            name: backend.name().to_string(),
                        },
                    };
                }
                Ok(_) => {
                    self.metrics.record_generation_failure();
                    warn!(
                        tenant = context.label(),
                        backend = backend.name(),
                        "backend returned an empty reply, trying next"
                    );
                }
                Err(error) => {
                    self.metrics.record_generation_failure();
                    warn!(
                        tenant = context.label(),
                        backend = backend.name(),
                        %error,
                        "backend failed, trying next"
                    );
                }
            }
        }

        warn!(
            tenant = context.label(),
            "all generation backends failed, using static fallback"
        );
        ComposedReply {
            text: STATIC_FALLBACK_REPLY.to_string(),
            source: ReplySource::StaticFallback,
        }
    }
}

/// Default template's instruction when any active template exists, else the
/// platform default. Templates arrive default-first from the loader, so the
/// first row is the policy winner.
pub fn system_instruction(templates: &[Template]) -> &str {
    templates
        .iter()
        .find(|template| template.is_default)
        .or_else(|| templates.first())
        .map(|template| template.system_instruction.as_str())
        .unwrap_or(DEFAULT_SYSTEM_INSTRUCTION)
}

/// First FAQ entry whose question contains the user text or vice versa,
/// case-insensitively. Deliberately crude: load order is the only tie-break,
/// and short questions can over-match; the knowledge loader's
/// priority/confidence ordering is what keeps the right entry first.
pub fn match_training_entry<'a>(
    user_text: &str,
    entries: &'a [TrainingEntry],
) -> Option<&'a TrainingEntry> {
    let user_lower = user_text.to_lowercase();
    entries.iter().find(|entry| {
        if entry.kind != TrainingEntryKind::Faq {
            return false;
        }
        let (Some(question), Some(answer)) = (entry.question.as_deref(), entry.answer.as_deref())
        else {
            return false;
        };
        if question.trim().is_empty() || answer.trim().is_empty() {
            return false;
        }
        let question_lower = question.to_lowercase();
        user_lower.contains(&question_lower) || question_lower.contains(&user_lower)
    })
}
