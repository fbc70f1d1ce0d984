use actix_web::{web, App, HttpResponse, HttpServer};
use analyzer_service::config::Config;
use analyzer_service::consumers::{ActionProjection, SimilarityProjection};
use analyzer_service::grpc::{RecommendationsControllerServer, RecommendationsImpl};
use analyzer_service::metrics::serve_metrics;
use analyzer_service::repository::{PgRecommendationStore, RecommendationStore};
use analyzer_service::services::RecommendationService;
use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use stream_consumer::{ConsumerMetrics, ConsumerPhase, KafkaSource, StreamWorker};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tonic::transport::Server as GrpcServer;
use tonic_health::server::health_reporter;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,analyzer_service=debug,stream_consumer=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Phases of both projection workers, shared with the readiness probe
#[derive(Clone)]
struct ConsumerPhases {
    actions: watch::Receiver<ConsumerPhase>,
    similarity: watch::Receiver<ConsumerPhase>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting analyzer-service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    info!("Configuration loaded and validated");

    let pg_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
        .context("Failed to create PostgreSQL pool")?;
    info!("PostgreSQL connection pool created");

    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run analyzer-service migrations")?;
    info!("Database migrations applied");

    let store: Arc<dyn RecommendationStore> = Arc::new(PgRecommendationStore::new(pg_pool));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let settings = config.worker_settings();
    let registry = prometheus::default_registry();
    let actions_metrics = ConsumerMetrics::register(registry, "action-projection")
        .context("Failed to register action projection metrics")?;
    let similarity_metrics = ConsumerMetrics::register(registry, "similarity-projection")
        .context("Failed to register similarity projection metrics")?;

    let actions_worker = StreamWorker::new(
        actions_metrics.clone(),
        KafkaSource::new(&config.actions_source()).context("Failed to create actions consumer")?,
        ActionProjection::new(store.clone()),
        settings.clone(),
        shutdown_rx.clone(),
    );
    let similarity_worker = StreamWorker::new(
        similarity_metrics.clone(),
        KafkaSource::new(&config.similarity_source())
            .context("Failed to create similarity consumer")?,
        SimilarityProjection::new(store.clone()),
        settings,
        shutdown_rx.clone(),
    );
    let phases = ConsumerPhases {
        actions: actions_worker.phase(),
        similarity: similarity_worker.phase(),
    };

    let mut join_set: JoinSet<Result<()>> = JoinSet::new();

    join_set.spawn(async move {
        actions_worker.run().await?;
        info!(processed = actions_metrics.processed(), "Action projection stopped");
        Ok(())
    });
    join_set.spawn(async move {
        similarity_worker.run().await?;
        info!(processed = similarity_metrics.processed(), "Similarity projection stopped");
        Ok(())
    });

    // gRPC server
    let grpc_addr: std::net::SocketAddr = format!("{}:{}", config.grpc_host, config.grpc_port)
        .parse()
        .context("Invalid gRPC address")?;
    let service = RecommendationService::new(store, config.query_settings());
    let mut grpc_shutdown = shutdown_rx.clone();

    join_set.spawn(async move {
        let (mut health, health_service) = health_reporter();
        health
            .set_serving::<RecommendationsControllerServer<RecommendationsImpl>>()
            .await;

        info!("Starting gRPC server on {}", grpc_addr);

        GrpcServer::builder()
            .add_service(health_service)
            .add_service(RecommendationsControllerServer::new(RecommendationsImpl::new(
                service,
            )))
            .serve_with_shutdown(grpc_addr, async move {
                let _ = grpc_shutdown.changed().await;
            })
            .await
            .map_err(|e| anyhow!("gRPC server error: {}", e))
    });

    // HTTP server for health checks and metrics
    info!("Starting HTTP server on {}:{}", config.http_host, config.http_port);
    let phase_data = web::Data::new(phases);
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(phase_data.clone())
            .route("/health", web::get().to(health_check))
            .route("/ready", web::get().to(readiness_check))
            .route("/metrics", web::get().to(serve_metrics))
    })
    .workers(1)
    .disable_signals()
    .bind((config.http_host.as_str(), config.http_port))
    .context("Failed to bind HTTP server")?
    .run();
    let http_handle = http_server.handle();

    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow!("HTTP server error: {}", e))
    });

    info!("analyzer-service is running");

    let mut first_error = None;
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        Some(result) = join_set.join_next() => {
            error!("A task stopped before shutdown was requested");
            first_error = task_error(result);
        }
    }

    shutdown_tx.send_replace(true);
    http_handle.stop(true).await;

    while let Some(result) = join_set.join_next().await {
        if let Some(e) = task_error(result) {
            error!("Task failed: {:#}", e);
            first_error.get_or_insert(e);
        }
    }

    info!("analyzer-service shut down");
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn task_error(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Option<anyhow::Error> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => Some(anyhow!("Task panicked: {}", e)),
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "analyzer-service"
    }))
}

async fn readiness_check(phases: web::Data<ConsumerPhases>) -> HttpResponse {
    let actions = *phases.actions.borrow();
    let similarity = *phases.similarity.borrow();
    let ready = actions == ConsumerPhase::Polling && similarity == ConsumerPhase::Polling;

    let body = serde_json::json!({
        "status": if ready { "ready" } else { "not_ready" },
        "actions_consumer": actions.to_string(),
        "similarity_consumer": similarity.to_string(),
        "service": "analyzer-service"
    });

    if ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
