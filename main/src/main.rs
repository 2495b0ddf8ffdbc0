use std::{sync::Arc, time::Duration};

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use generation_pipeline::{
    BulkJobOrchestrator, OpenAiContentClient, OrchestratorTuning, ProgressReporter,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    // Ensure db is initialized
    db.ensure_initialized().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let content_client = Arc::new(OpenAiContentClient::new(
        openai_client,
        Duration::from_secs(config.generation_timeout_secs),
    ));

    let orchestrator = Arc::new(BulkJobOrchestrator::new(
        db.clone(),
        content_client,
        OrchestratorTuning {
            max_item_concurrency: config.max_item_concurrency,
        },
    ));

    // Pick jobs left unfinished by a previous run back up before serving
    let resumed = orchestrator.resume_incomplete().await?;
    if resumed > 0 {
        info!(resumed, "Resumed unfinished generation jobs");
    }

    let reporter = ProgressReporter::new(db.clone());
    let api_state = ApiState::new(db, config.clone(), orchestrator, reporter);

    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
