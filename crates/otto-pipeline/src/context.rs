//! Tenant context resolution: one sum type covers both the resolved-tenant
//! and platform-default paths so downstream code never branches on tenant
//! presence.

use otto_channel::ChannelCredentials;
use otto_types::Tenant;

/// Platform-level fallbacks used when a conversation has no tenant or the
/// tenant leaves a credential field unset.
#[derive(Debug, Clone)]
pub struct PlatformDefaults {
    pub generation_provider: String,
    pub generation_model: String,
    pub generation_api_key: String,
    pub channel: ChannelCredentials,
}

/// Fully resolved generation credentials for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationCredentials {
    pub provider: String,
    pub model: String,
    pub api_key: String,
}

/// The tenant owning a conversation, or the platform default when no active
/// tenant matches the routing key.
#[derive(Debug, Clone)]
pub enum TenantContext {
    Resolved(Tenant),
    Default,
}

impl TenantContext {
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Self::Resolved(tenant) => Some(tenant.tenant_id.as_str()),
            Self::Default => None,
        }
    }

    /// Human-readable label for logs.
    pub fn label(&self) -> &str {
        match self {
            Self::Resolved(tenant) => tenant.display_name.as_str(),
            Self::Default => "platform-default",
        }
    }

    /// Generation credentials with per-field fallback to platform defaults,
    /// so a tenant may override only its model or only its key.
    pub fn generation_credentials(&self, defaults: &PlatformDefaults) -> GenerationCredentials {
        match self {
            Self::Resolved(tenant) => GenerationCredentials {
                provider: non_empty(tenant.generation_provider.as_deref())
                    .unwrap_or(&defaults.generation_provider)
                    .to_string(),
                model: non_empty(tenant.generation_model.as_deref())
                    .unwrap_or(&defaults.generation_model)
                    .to_string(),
                api_key: non_empty(tenant.generation_api_key.as_deref())
                    .unwrap_or(&defaults.generation_api_key)
                    .to_string(),
            },
            Self::Default => GenerationCredentials {
                provider: defaults.generation_provider.clone(),
                model: defaults.generation_model.clone(),
                api_key: defaults.generation_api_key.clone(),
            },
        }
    }

    /// Channel credentials for outbound delivery. Returns `Some` only when
    /// the tenant actually overrides the access token; only then does the
    /// delivery engine's platform-credential fallback apply.
    pub fn tenant_channel_credentials(
        &self,
        defaults: &PlatformDefaults,
    ) -> Option<ChannelCredentials> {
        let Self::Resolved(tenant) = self else {
            return None;
        };
        let access_token = non_empty(tenant.channel_access_token.as_deref())?;
        Some(ChannelCredentials {
            access_token: access_token.to_string(),
            sender_id: non_empty(tenant.channel_sender_id.as_deref())
                .unwrap_or(&defaults.channel.sender_id)
                .to_string(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use otto_channel::ChannelCredentials;
    use otto_types::Tenant;

    use super::{PlatformDefaults, TenantContext};

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

    fn tenant() -> Tenant {
        let now = Utc::now();
        Tenant {
            tenant_id: "acme".to_string(),
            routing_key: "254700000001".to_string(),
            display_name: "Acme".to_string(),
            brand_ref: None,
            is_active: true,
            is_verified: true,
            escalation_contact: None,
            generation_provider: None,
            generation_model: Some("gpt-4.1-mini".to_string()),
            generation_api_key: Some("acme-key".to_string()),
            channel_access_token: None,
            channel_sender_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unit_default_context_exposes_platform_credentials() {
        let context = TenantContext::Default;
        let credentials = context.generation_credentials(&defaults());
        assert_eq!(credentials.provider, "openai");
        assert_eq!(credentials.api_key, "platform-key");
        assert!(context.tenant_channel_credentials(&defaults()).is_none());
        assert_eq!(context.tenant_id(), None);
        assert_eq!(context.label(), "platform-default");
    }

    #[test]
    fn unit_resolved_context_merges_credentials_per_field() {
        let context = TenantContext::Resolved(tenant());
        let credentials = context.generation_credentials(&defaults());
        assert_eq!(credentials.provider, "openai");
        assert_eq!(credentials.model, "gpt-4.1-mini");
        assert_eq!(credentials.api_key, "acme-key");
    }

    #[test]
    fn tenant_channel_credentials_require_a_token_override() {
        let mut with_token = tenant();
        with_token.channel_access_token = Some("acme-token".to_string());
        let context = TenantContext::Resolved(with_token);
        let credentials = context
            .tenant_channel_credentials(&defaults())
            .expect("token override present");
        assert_eq!(credentials.access_token, "acme-token");
        assert_eq!(credentials.sender_id, "1000");

        let context = TenantContext::Resolved(tenant());
        assert!(context.tenant_channel_credentials(&defaults()).is_none());
    }
}
