use actix_web::{web, App, HttpResponse, HttpServer};
use aggregator_service::config::Config;
use aggregator_service::metrics::{serve_metrics, PublishMetrics};
use aggregator_service::services::{AggregationHandler, KafkaSimilarityPublisher};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use stream_consumer::{ConsumerMetrics, ConsumerPhase, KafkaSource, StreamWorker};
use tokio::sync::watch;
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
                .unwrap_or_else(|_| "info,aggregator_service=debug,stream_consumer=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting aggregator-service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    let policy = config.publish_policy()?;
    info!(policy = ?policy, "Configuration loaded and validated");

    let publisher = KafkaSimilarityPublisher::new(
        &config.kafka_brokers,
        &config.similarity_topic,
        config.publish_timeout(),
    )
    .context("Failed to create similarity publisher")?;

    let registry = prometheus::default_registry();
    let publish_metrics =
        PublishMetrics::register(registry).context("Failed to register publish metrics")?;
    let consumer_metrics = ConsumerMetrics::register(registry, "aggregator")
        .context("Failed to register consumer metrics")?;

    let handler = AggregationHandler::new(
        Arc::new(publisher),
        policy,
        config.drain_timeout(),
        publish_metrics.clone(),
    );
    let source =
        KafkaSource::new(&config.kafka_source()).context("Failed to create Kafka consumer")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = StreamWorker::new(
        consumer_metrics.clone(),
        source,
        handler,
        config.worker_settings(),
        shutdown_rx,
    );
    let phase = worker.phase();
    let mut worker_handle = tokio::spawn(worker.run());

    // HTTP server for health checks and metrics
    info!("Starting HTTP server on {}:{}", config.http_host, config.http_port);
    let phase_data = web::Data::new(phase);
    let server = HttpServer::new(move || {
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
    let server_handle = server.handle();
    tokio::spawn(server);

    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining aggregator");
            shutdown_tx.send_replace(true);
            (&mut worker_handle).await
        }
        finished = &mut worker_handle => finished,
    };

    server_handle.stop(true).await;

    match outcome {
        Ok(Ok(())) => {
            info!(
                processed = consumer_metrics.processed(),
                commits = consumer_metrics.commits(),
                published = publish_metrics.published(),
                dropped = publish_metrics.dropped(),
                "aggregator-service stopped"
            );
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Aggregator consumer failed");
            Err(anyhow!(e))
        }
        Err(e) => Err(anyhow!("Aggregator worker panicked: {}", e)),
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "aggregator-service"
    }))
}

async fn readiness_check(phase: web::Data<watch::Receiver<ConsumerPhase>>) -> HttpResponse {
    let current = *phase.borrow();
    let body = serde_json::json!({
        "status": if current == ConsumerPhase::Polling { "ready" } else { "not_ready" },
        "phase": current.to_string(),
        "service": "aggregator-service"
    });

    if current == ConsumerPhase::Polling {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
