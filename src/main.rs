use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use havn::app::{self, AppState};
use havn::cli::{Cli, Command};
use havn::collector;
use havn::config::Settings;
use havn::pipeline::Pipeline;
use havn::query::QueryEngine;
use havn::worker::WorkerPool;
use havn::{metrics::Metrics, storage};

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut settings);
    settings.validate().context("invalid configuration")?;

    app::tracing::init_tracing(&settings.log.level, &settings.log.format);

    match cli.command {
        Command::Serve { .. } => serve(settings).await,
        Command::Collect { .. } => collect(settings).await,
        Command::Query { ref query, .. } => run_query(settings, query).await,
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let state = Arc::new(AppState::from_settings(&settings, cancel.clone()).await?);

    // Collectors are optional in serve mode; they share the server's storage.
    let mut supervisor = None;
    if !settings.collect.sources.is_empty() {
        let collectors = build_collectors(&settings.collect.sources, state.pipeline.clone())?;
        let token = cancel.clone();
        supervisor = Some(tokio::spawn(async move {
            collector::run_all(collectors, token).await
        }));
    }

    let router = app::api_router(state.clone());
    let result = app::serve(router, &settings.api.host, settings.api.port, cancel.clone()).await;

    cancel.cancel();
    if let Some(handle) = supervisor {
        if let Ok(Err(e)) = handle.await {
            error!(error = %e, "collector supervisor failed");
        }
    }
    state.shutdown(SHUTDOWN_DRAIN).await;

    result?;
    Ok(())
}

async fn collect(settings: Settings) -> anyhow::Result<()> {
    let metrics = Metrics::unregistered();
    let store = storage::open(&settings.collect.storage, &settings.collect.storage_path)?;
    let pool = Arc::new(WorkerPool::new(settings.collect.workers, metrics.clone()));
    let pipeline = Arc::new(Pipeline::new(store.clone(), pool.clone(), metrics));

    let collectors = build_collectors(&settings.collect.sources, pipeline)?;

    let cancel = CancellationToken::new();
    pool.start(cancel.child_token()).await;

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        app::shutdown_signal().await;
        signal_token.cancel();
    });

    let result = collector::run_all(collectors, cancel).await;

    info!("shutting down");
    pool.stop(SHUTDOWN_DRAIN).await;
    if let Err(e) = store.close() {
        error!(error = %e, "error closing storage");
    }

    result?;
    info!("collection stopped");
    Ok(())
}

async fn run_query(settings: Settings, input: &str) -> anyhow::Result<()> {
    let store = storage::open(&settings.query.storage, &settings.query.storage_path)?;
    let engine = QueryEngine::new(store.clone());

    let mut query = engine.parse_query(input);
    if query.limit == havn::domain::Query::default().limit {
        query.limit = settings.query.limit;
    }

    let entries = engine.execute(&query)?;
    println!("{}", serde_json::to_string_pretty(&entries)?);

    store.close().ok();
    Ok(())
}

fn build_collectors(
    sources: &[String],
    pipeline: Arc<Pipeline>,
) -> anyhow::Result<Vec<Box<dyn collector::Collector>>> {
    let mut collectors = Vec::new();
    for source in sources {
        match collector::from_uri(source, pipeline.clone()) {
            Ok(c) => collectors.push(c),
            Err(e) => error!(source = %source, error = %e, "failed to initialize collector"),
        }
    }

    if collectors.is_empty() {
        anyhow::bail!("no valid collectors configured");
    }
    Ok(collectors)
}
