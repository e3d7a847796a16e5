use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use eventline_core::AppConfig;
use eventline_extract::OpenAiExtractionClient;
use eventline_pipeline::scheduler::Phase2Config;
use tracing_subscriber::EnvFilter;

mod routes;

#[derive(Parser)]
#[command(name = "eventline-server", about = "News extraction and event pipeline server")]
struct Cli {
    /// Run a single Phase-2 extraction batch and exit, instead of serving HTTP.
    #[arg(long)]
    run_phase2_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    tracing::info!("Starting eventline-server");

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let http_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;

    let worker_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Connected to database (http_pool=20, worker_pool=8)");

    sqlx::migrate!("../../migrations").run(&http_pool).await?;
    tracing::info!("Migrations complete");

    let extraction_client: Arc<dyn eventline_extract::ExtractionClient> = Arc::new(OpenAiExtractionClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.openai_timeout_seconds,
        config.openai_max_retries,
    ));

    if cli.run_phase2_once {
        let phase2_config = Phase2Config {
            extraction_enabled: config.phase2_extraction_enabled,
            api_key_set: !config.openai_api_key.is_empty(),
            batch_size: config.phase2_batch_size,
            lease_seconds: config.phase2_lease_seconds,
            scheduler_lock_seconds: config.phase2_scheduler_lock_seconds,
            evidence_enabled: config.phase2_requires_evidence_enabled,
        };
        let summary = eventline_pipeline::scheduler::process_phase2_batch(
            extraction_client.as_ref(),
            &phase2_config,
            &worker_pool,
        )
        .await?;
        tracing::info!(?summary, "phase2_once_done");
        return Ok(());
    }

    let deps = Arc::new(routes::AppDeps {
        pool: http_pool,
        config: config.clone(),
        extraction_client: extraction_client.clone(),
    });

    let app = routes::build_router(deps);

    let scheduler_pool = worker_pool.clone();
    let scheduler_client = extraction_client.clone();
    let scheduler_config = Phase2Config {
        extraction_enabled: config.phase2_extraction_enabled,
        api_key_set: !config.openai_api_key.is_empty(),
        batch_size: config.phase2_batch_size,
        lease_seconds: config.phase2_lease_seconds,
        scheduler_lock_seconds: config.phase2_scheduler_lock_seconds,
        evidence_enabled: config.phase2_requires_evidence_enabled,
    };
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            if let Err(err) = eventline_pipeline::scheduler::process_phase2_batch(
                scheduler_client.as_ref(),
                &scheduler_config,
                &scheduler_pool,
            )
            .await
            {
                tracing::error!(error = %err, "phase2_background_run_failed");
            }
        }
    });

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
