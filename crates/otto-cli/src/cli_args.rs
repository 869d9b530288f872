use std::path::PathBuf;

use clap::{Parser, Subcommand};
use otto_pipeline::RetryPolicy;

#[derive(Debug, Parser)]
#[command(
    name = "otto",
    about = "Multi-tenant inbound-message pipeline for chat customer service",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "OTTO_DB_PATH",
        default_value = ".otto/otto.sqlite",
        help = "Path to the SQLite database backing tenants, the conversation ledger, and delivery attempts"
    )]
    pub db_path: PathBuf,

    #[arg(
        long,
        env = "OTTO_GENERATION_PROVIDER",
        default_value = "openai",
        help = "Platform-default generation provider label used when a tenant has no override"
    )]
    pub generation_provider: String,

    #[arg(
        long,
        env = "OTTO_GENERATION_API_BASE",
        default_value = otto_ai::DEFAULT_PRIMARY_API_BASE,
        help = "Base URL for the primary OpenAI-compatible generation API"
    )]
    pub generation_api_base: String,

    #[arg(
        long,
        env = "OTTO_GENERATION_MODEL",
        default_value = otto_ai::DEFAULT_PRIMARY_MODEL,
        help = "Platform-default generation model used when a tenant has no override"
    )]
    pub generation_model: String,

    #[arg(
        long,
        env = "OTTO_GENERATION_API_KEY",
        default_value = "",
        help = "Platform-default generation API key"
    )]
    pub generation_api_key: String,

    #[arg(
        long,
        env = "OTTO_OPENROUTER_API_KEY",
        default_value = "",
        help = "API key for the first generation fallback route"
    )]
    pub openrouter_api_key: String,

    #[arg(
        long,
        env = "OTTO_HF_API_KEY",
        default_value = "",
        help = "API key for the second generation fallback route"
    )]
    pub hf_api_key: String,

    #[arg(
        long,
        env = "OTTO_CHANNEL_API_BASE",
        default_value = otto_channel::DEFAULT_CHANNEL_API_BASE,
        help = "Base URL for the outbound cloud messaging API"
    )]
    pub channel_api_base: String,

    #[arg(
        long,
        env = "OTTO_CHANNEL_ACCESS_TOKEN",
        default_value = "",
        help = "Platform-default outbound channel access token"
    )]
    pub channel_access_token: String,

    #[arg(
        long,
        env = "OTTO_CHANNEL_SENDER_ID",
        default_value = "",
        help = "Platform-default sender id the channel token is scoped to"
    )]
    pub channel_sender_id: String,

    #[arg(
        long,
        env = "OTTO_HTTP_TIMEOUT_MS",
        default_value_t = 10_000,
        help = "Timeout for outbound HTTP calls, in milliseconds"
    )]
    pub http_timeout_ms: u64,

    #[arg(
        long,
        env = "OTTO_RETRY_INTERVAL_SECS",
        default_value_t = 300,
        help = "Seconds between retry sweeps"
    )]
    pub retry_interval_secs: u64,

    #[arg(
        long,
        env = "OTTO_RETRY_MAX_RETRIES",
        default_value_t = 3,
        help = "Maximum sweeper retries per failed delivery"
    )]
    pub retry_max_retries: u32,

    #[arg(
        long,
        env = "OTTO_RETRY_WINDOW_HOURS",
        default_value_t = 24,
        help = "Only deliveries that failed within this many hours are retried"
    )]
    pub retry_window_hours: i64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the retry sweeper and run until interrupted. Inbound messages
    /// arrive through the embedding webhook transport, not this process.
    Run,
    /// Send one outbound message through the delivery engine.
    Send {
        #[arg(long, help = "Recipient identity, e.g. an E.164 phone number")]
        to: String,
        #[arg(long, help = "Message text", conflicts_with = "image_link")]
        text: Option<String>,
        #[arg(long = "image-link", help = "Send an image by URL instead of text")]
        image_link: Option<String>,
        #[arg(long, help = "Caption for --image-link", requires = "image_link")]
        caption: Option<String>,
    },
    /// Drive one inbound message through the full pipeline and print the
    /// outcome. Useful for verifying tenant knowledge without a live
    /// webhook.
    Simulate {
        #[arg(long, help = "Sender identity / routing key")]
        from: String,
        #[arg(long, help = "Inbound message text")]
        text: String,
        #[arg(long = "message-id", help = "External message id; generated when omitted")]
        message_id: Option<String>,
        #[arg(long, help = "Sender display name")]
        name: Option<String>,
    },
    /// Run exactly one retry sweep and exit.
    Sweep,
}

impl Cli {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_max_retries,
            window: chrono::Duration::hours(self.retry_window_hours),
            interval: std::time::Duration::from_secs(self.retry_interval_secs.max(1)),
        }
    }
}
