use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use otto_channel::{ChannelCredentials, CloudApiTransport, OutboundPayload};
use otto_core::system_clock;
use otto_pipeline::{
    DeliveryEngine, HttpBackendProvisioner, InboundMessage, KnowledgeLoader, Pipeline,
    PipelineMetrics, PlatformDefaults, ReplyComposer, RetrySweeper, TenantDirectory,
};
use otto_store::{PipelineStore, SqlitePipelineStore};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

mod cli_args;

use cli_args::{Cli, Command};

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let store: Arc<dyn PipelineStore> = Arc::new(
        SqlitePipelineStore::new(&cli.db_path)
            .with_context(|| format!("failed to open store at {}", cli.db_path.display()))?,
    );
    let metrics = Arc::new(PipelineMetrics::new());
    let transport = Arc::new(
        CloudApiTransport::new(&cli.channel_api_base, cli.http_timeout_ms)
            .context("failed to build channel transport")?,
    );
    let defaults = PlatformDefaults {
        generation_provider: cli.generation_provider.clone(),
        generation_model: cli.generation_model.clone(),
        generation_api_key: cli.generation_api_key.clone(),
        channel: ChannelCredentials {
            access_token: cli.channel_access_token.clone(),
            sender_id: cli.channel_sender_id.clone(),
        },
    };
    let engine = Arc::new(DeliveryEngine::new(
        transport,
        store.clone(),
        defaults.channel.clone(),
        metrics.clone(),
    ));

    match cli.command {
        Command::Run => {
            let sweeper = Arc::new(RetrySweeper::new(
                store.clone(),
                engine.clone(),
                cli.retry_policy(),
                system_clock(),
            ));
            let handle = sweeper.spawn();
            info!(db = %cli.db_path.display(), "otto is running; press ctrl-c to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to wait for shutdown signal")?;
            handle.abort();
            info!("shutting down");
        }
        Command::Send {
            to,
            text,
            image_link,
            caption,
        } => {
            let payload = match (text, image_link) {
                (_, Some(link)) => OutboundPayload::Image { link, caption },
                (Some(body), None) => OutboundPayload::text(body),
                (None, None) => anyhow::bail!("send requires --text or --image-link"),
            };
            let delivered = engine.deliver(&to, &payload, None).await;
            if delivered {
                println!("delivered to {to}");
            } else {
                println!("delivery to {to} failed; attempt recorded for retry");
            }
        }
        Command::Simulate {
            from,
            text,
            message_id,
            name,
        } => {
            let provisioner = Arc::new(HttpBackendProvisioner::new(
                &cli.generation_api_base,
                &cli.openrouter_api_key,
                &cli.hf_api_key,
                cli.http_timeout_ms,
            ));
            let pipeline = Pipeline::new(
                store.clone(),
                TenantDirectory::new(store.clone()),
                KnowledgeLoader::new(store.clone()),
                ReplyComposer::new(metrics.clone()),
                engine,
                provisioner,
                defaults,
            );

            let external_message_id = message_id
                .unwrap_or_else(|| format!("sim-{}", chrono::Utc::now().timestamp_millis()));
            let raw_payload = serde_json::json!({
                "simulated": true,
                "text": { "body": text },
            });
            let outcome = pipeline
                .handle_inbound(InboundMessage {
                    sender: from.clone(),
                    sender_name: name,
                    text,
                    external_message_id,
                    raw_payload: Some(raw_payload),
                })
                .await;

            if outcome.duplicate {
                println!("message id already processed, nothing to do");
                return Ok(());
            }
            println!(
                "tenant: {}",
                outcome.tenant_id.as_deref().unwrap_or("(platform default)")
            );
            println!("reply ({}): {}", outcome.source.as_str(), outcome.reply);
            println!("delivered: {}", outcome.delivered);

            let history = store
                .list_messages_for_contact(&from, 4)
                .await
                .context("failed to read conversation ledger")?;
            println!("ledger (newest first):");
            for message in history {
                println!("  [{}] {}", message.direction.as_str(), message.body);
            }
        }
        Command::Sweep => {
            let sweeper = RetrySweeper::new(
                store.clone(),
                engine.clone(),
                cli.retry_policy(),
                system_clock(),
            );
            let report = sweeper.run_sweep().await;
            println!(
                "sweep: scanned={} resent={} still_failed={} exhausted={}",
                report.scanned, report.resent, report.still_failed, report.exhausted
            );
        }
    }

    Ok(())
}
