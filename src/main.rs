use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use nodesift::app::App;
use nodesift::notify::{Notifier, NoopNotifier, TelegramNotifier};
use nodesift::persist::store::RemoteSqlBackend;
use nodesift::sandbox::engine::BinaryEngine;

#[derive(Debug, Parser)]
#[command(name = "nodesift")]
#[command(about = "Gather proxy nodes from subscription feeds, sandbox-test them, persist the survivors")]
struct Args {
    /// Path to the YAML settings file
    #[arg(default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("nodesift starting...");

    let settings = nodesift::config::load_settings(&args.config)?;
    info!(feeds = settings.feed_sources.len(), "settings loaded");

    let engine = Arc::new(BinaryEngine::new(settings.engine_binary.clone()));
    let backend = RemoteSqlBackend::new(&settings.database.url, settings.database.auth_token.as_deref());
    let notifier: Arc<dyn Notifier> = match &settings.telegram {
        Some(tg) => Arc::new(TelegramNotifier::new(&tg.bot_token, tg.chat_id)),
        None => Arc::new(NoopNotifier),
    };

    let app = App::new(settings, engine, Box::new(backend), notifier);
    app.run().await?;

    Ok(())
}
