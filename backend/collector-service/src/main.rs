use anyhow::{Context, Result};
use collector_service::config::Config;
use collector_service::grpc::{UserActionControllerImpl, UserActionControllerServer};
use collector_service::services::KafkaActionProducer;
use std::sync::Arc;
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

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,collector_service=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Starting collector-service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let producer = KafkaActionProducer::new(
        &config.kafka_brokers,
        &config.actions_topic,
        config.publish_timeout(),
    )
    .context("Failed to create action producer")?;

    let grpc_addr: std::net::SocketAddr = format!("{}:{}", config.grpc_host, config.grpc_port)
        .parse()
        .context("Invalid gRPC address")?;

    let (mut health, health_service) = health_reporter();
    health
        .set_serving::<UserActionControllerServer<UserActionControllerImpl>>()
        .await;

    info!("Starting gRPC server on {}", grpc_addr);

    GrpcServer::builder()
        .add_service(health_service)
        .add_service(UserActionControllerServer::new(UserActionControllerImpl::new(
            Arc::new(producer),
        )))
        .serve_with_shutdown(grpc_addr, shutdown_signal())
        .await
        .context("gRPC server error")?;

    info!("collector-service shut down");
    Ok(())
}
