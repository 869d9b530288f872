//! Knowledge loading: per-tenant templates and training data.

use std::sync::Arc;

use otto_store::PipelineStore;
use otto_types::{Template, TrainingEntry};
use tracing::warn;

/// Loads a tenant's active knowledge. `None` tenant ids (default-context
/// conversations) skip the store entirely and yield empty lists, and store
/// errors degrade to empty rather than aborting the conversation.
pub struct KnowledgeLoader {
    store: Arc<dyn PipelineStore>,
}

impl KnowledgeLoader {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    pub async fn load_templates(&self, tenant_id: Option<&str>) -> Vec<Template> {
        let Some(tenant_id) = tenant_id else {
            return Vec::new();
        };

        match self.store.load_active_templates(tenant_id).await {
            Ok(templates) => templates,
            Err(error) => {
                warn!(tenant_id, %error, "template load failed, continuing without templates");
                Vec::new()
            }
        }
    }

    pub async fn load_training_data(&self, tenant_id: Option<&str>) -> Vec<TrainingEntry> {
        let Some(tenant_id) = tenant_id else {
            return Vec::new();
        };

        match self.store.load_active_training_entries(tenant_id).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(tenant_id, %error, "training data load failed, continuing without it");
                Vec::new()
            }
        }
    }
}
