//! Generation-backend clients for the otto reply composer.
//!
//! Every production backend speaks the OpenAI-compatible chat-completions
//! dialect, so one HTTP client type covers the primary provider and both
//! fallback routes; they differ only in base URL, key, and model.

mod chat;
mod types;

pub use chat::{ChatCompletionsClient, ChatCompletionsConfig};
pub use types::{CompletionRequest, GenerationBackend, GenerationError};

/// Default API base for the primary OpenAI-compatible provider.
pub const DEFAULT_PRIMARY_API_BASE: &str = "https://api.openai.com/v1";
/// Default model for the primary provider when a tenant has no override.
pub const DEFAULT_PRIMARY_MODEL: &str = "gpt-4o-mini";

/// API base for the first fallback route (OpenRouter).
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
/// Free-tier model pinned for the first fallback route.
pub const OPENROUTER_FALLBACK_MODEL: &str = "meta-llama/llama-3.3-70b-instruct:free";

/// API base for the second fallback route (Hugging Face router).
pub const HF_ROUTER_API_BASE: &str = "https://router.huggingface.co/v1";
/// Model pinned for the second fallback route.
pub const HF_FALLBACK_MODEL: &str = "meta-llama/Llama-3.1-8B-Instruct:novita";
