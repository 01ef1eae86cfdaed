use std::sync::Arc;

use scorecard_bot::catalog::Catalog;
use scorecard_bot::channels::{TelegramTransport, Transport};
use scorecard_bot::config::BotConfig;
use scorecard_bot::dispatch::Dispatcher;
use scorecard_bot::sink::{CsvLogSink, ResponseSink};
use scorecard_bot::survey::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  export SCOREBOT_TOKEN=123456:ABC-...");
            std::process::exit(1);
        }
    };

    // Catalog: built-in form, or a JSON override. Invalid catalogs never
    // reach the engine.
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::from_json_file(path)?,
        None => Catalog::builtin(),
    };
    catalog.validate()?;
    let catalog = Arc::new(catalog);

    eprintln!("🗳️  scorecard-bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Form: {} stages", catalog.stages().len());
    eprintln!("   Log: {}", config.log_path.display());
    eprintln!("   Send /start to the bot to begin.\n");

    let sink: Arc<dyn ResponseSink> = Arc::new(CsvLogSink::new(
        config.log_path.clone(),
        Arc::clone(&catalog),
    ));
    let engine = Engine::new(Arc::clone(&catalog), sink);

    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(
        config.bot_token.clone(),
        config.allowed_users.clone(),
        config.poll_timeout_secs,
    ));

    // Bot account must be reachable before we start taking submissions.
    let username = transport.health_check().await?;
    tracing::info!("authorized as @{username}");

    Dispatcher::new(engine, transport, config.admin_users.clone())
        .run()
        .await?;

    Ok(())
}
