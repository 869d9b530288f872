//! Tenant directory: maps an inbound routing key onto tenant configuration.

use std::sync::Arc;

use otto_store::PipelineStore;
use tracing::{debug, warn};

use crate::context::TenantContext;

/// Resolves routing keys against the tenant table.
///
/// Resolution fails open: a missing row, an inactive tenant, or a store
/// error all yield the platform-default context rather than rejecting the
/// inbound message.
pub struct TenantDirectory {
    store: Arc<dyn PipelineStore>,
}

impl TenantDirectory {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, routing_key: &str) -> TenantContext {
        match self.store.find_tenant_by_routing_key(routing_key).await {
            Ok(Some(tenant)) if tenant.is_active => {
                debug!(routing_key, tenant = %tenant.display_name, "tenant resolved");
                TenantContext::Resolved(tenant)
            }
            Ok(Some(tenant)) => {
                warn!(
                    routing_key,
                    tenant = %tenant.display_name,
                    "tenant is inactive, using platform default"
                );
                TenantContext::Default
            }
            Ok(None) => {
                debug!(routing_key, "no tenant for routing key, using platform default");
                TenantContext::Default
            }
            Err(error) => {
                warn!(routing_key, %error, "tenant lookup failed, using platform default");
                TenantContext::Default
            }
        }
    }
}
