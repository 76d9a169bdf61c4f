use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod business_time;
mod classifier;
mod config;
mod db;
mod error;
mod formatter;
mod notifications;
mod orchestrator;
mod routes;
mod routing;
mod run_tracker;
mod scheduler;
mod services;
mod sync;

use config::Config;
use notifications::{HttpWebhookSender, NoOpAdvisor};
use orchestrator::TickOrchestrator;
use scheduler::Scheduler;
use sync::HttpOpportunityFetcher;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub scheduler: Scheduler,
    pub orchestrator: Arc<TickOrchestrator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sla_field_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Field-Service SLA Monitoring Agent");

    let pool = services::init::init_db(&config).await?;

    let fetcher: Box<dyn sync::OpportunityFetcher> =
        Box::new(HttpOpportunityFetcher::new(&config.fetcher)?);
    let sender: Box<dyn notifications::WebhookSender> = Box::new(HttpWebhookSender::new(&config.webhook));
    let advisor: Box<dyn notifications::DecisionAdvisor> = Box::new(NoOpAdvisor);

    let orchestrator = Arc::new(TickOrchestrator::new(
        pool.clone(),
        fetcher,
        sender,
        advisor,
        config.webhook.escalation_webhook_url.clone(),
        Duration::from_secs(config.scheduler.tick_timeout_seconds),
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let (scheduler, scheduler_handle) = services::init::spawn_scheduler(
        orchestrator.clone(),
        Duration::from_secs(config.scheduler.execution_interval_minutes * 60),
        &shutdown_tx,
    );

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        scheduler,
        orchestrator: orchestrator.clone(),
    });

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/runs", routes::runs::router())
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let host = config.server.host.clone();
    let port = config.server.port;
    let addr = format!("{host}:{port}");

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let mut server_shutdown_rx = shutdown_tx.subscribe();
    let server = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = server_shutdown_rx.recv().await;
        });

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = scheduler_handle.await;

    Ok(())
}
