//! Backend chain provisioning: builds the ordered generation chain for one
//! conversation from its resolved credentials.

use std::sync::Arc;

use async_trait::async_trait;
use otto_ai::{
    ChatCompletionsClient, ChatCompletionsConfig, CompletionRequest, GenerationBackend,
    GenerationError, HF_FALLBACK_MODEL, HF_ROUTER_API_BASE, OPENROUTER_API_BASE,
    OPENROUTER_FALLBACK_MODEL,
};
use tracing::warn;

use crate::context::GenerationCredentials;

/// Builds the ordered backend chain for one conversation. Separated behind a
/// trait so tests can swap in scripted backends.
pub trait BackendProvisioner: Send + Sync {
    fn chain_for(&self, credentials: &GenerationCredentials) -> Vec<Arc<dyn GenerationBackend>>;
}

/// Production provisioner: a per-conversation primary client (tenant keys
/// differ) plus two shared platform fallback routes.
pub struct HttpBackendProvisioner {
    primary_api_base: String,
    request_timeout_ms: u64,
    fallbacks: Vec<Arc<dyn GenerationBackend>>,
}

impl HttpBackendProvisioner {
    pub fn new(
        primary_api_base: impl Into<String>,
        openrouter_api_key: &str,
        hf_api_key: &str,
        request_timeout_ms: u64,
    ) -> Self {
        let mut fallbacks: Vec<Arc<dyn GenerationBackend>> = Vec::new();
        fallbacks.push(build_route(
            "openrouter",
            OPENROUTER_API_BASE,
            openrouter_api_key,
            OPENROUTER_FALLBACK_MODEL,
            request_timeout_ms,
        ));
        fallbacks.push(build_route(
            "huggingface",
            HF_ROUTER_API_BASE,
            hf_api_key,
            HF_FALLBACK_MODEL,
            request_timeout_ms,
        ));

        Self {
            primary_api_base: primary_api_base.into(),
            request_timeout_ms,
            fallbacks,
        }
    }
}

impl BackendProvisioner for HttpBackendProvisioner {
    fn chain_for(&self, credentials: &GenerationCredentials) -> Vec<Arc<dyn GenerationBackend>> {
        let mut chain = Vec::with_capacity(self.fallbacks.len() + 1);
        chain.push(build_route(
            &credentials.provider,
            &self.primary_api_base,
            &credentials.api_key,
            &credentials.model,
            self.request_timeout_ms,
        ));
        chain.extend(self.fallbacks.iter().cloned());
        chain
    }
}

/// A chain stage that could not be constructed (typically a missing key).
/// It stays in the chain so the stage is still attempted, logged, and
/// counted like any other failure before the chain advances.
struct UnavailableBackend {
    name: String,
    detail: String,
}

#[async_trait]
impl GenerationBackend for UnavailableBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, GenerationError> {
        Err(GenerationError::InvalidResponse(format!(
            "backend unavailable: {}",
            self.detail
        )))
    }
}

fn build_route(
    name: &str,
    api_base: &str,
    api_key: &str,
    model: &str,
    request_timeout_ms: u64,
) -> Arc<dyn GenerationBackend> {
    match ChatCompletionsClient::new(ChatCompletionsConfig {
        backend_name: name.to_string(),
        api_base: api_base.to_string(),
        api_key: api_key.to_string(),
        model: model.to_string(),
        request_timeout_ms,
    }) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            warn!(backend = name, %error, "backend route not usable");
            Arc::new(UnavailableBackend {
                name: name.to_string(),
                detail: error.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use otto_ai::{CompletionRequest, GenerationBackend};

    use super::{BackendProvisioner, HttpBackendProvisioner};
    use crate::context::GenerationCredentials;

    fn credentials(api_key: &str) -> GenerationCredentials {
        GenerationCredentials {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: api_key.to_string(),
        }
    }

    #[test]
    fn chain_is_primary_then_openrouter_then_huggingface() {
        let provisioner =
            HttpBackendProvisioner::new("https://api.example.test/v1", "or-key", "hf-key", 2_000);
        let chain = provisioner.chain_for(&credentials("tenant-key"));
        let names: Vec<&str> = chain.iter().map(|backend| backend.name()).collect();
        assert_eq!(names, vec!["openai", "openrouter", "huggingface"]);
    }

    #[tokio::test]
    async fn unit_missing_key_keeps_the_stage_as_a_failing_attempt() {
        let provisioner =
            HttpBackendProvisioner::new("https://api.example.test/v1", "or-key", "hf-key", 2_000);
        let chain = provisioner.chain_for(&credentials(""));
        assert_eq!(chain.len(), 3);

        let error = chain[0]
            .complete(&CompletionRequest {
                system_instruction: "instruction".to_string(),
                user_text: "hello".to_string(),
            })
            .await
            .expect_err("unavailable backend should fail");
        assert!(error.to_string().contains("backend unavailable"));
    }
}
