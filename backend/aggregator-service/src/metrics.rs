use actix_web::HttpResponse;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Outcome counters for similarity publishing.
#[derive(Clone)]
pub struct PublishMetrics {
    published: IntCounter,
    dropped: IntCounter,
    failed_attempts: IntCounter,
}

impl PublishMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let published = IntCounter::new(
            "aggregator_similarity_published_total",
            "Similarity records delivered to the similarity topic",
        )?;
        let dropped = IntCounter::new(
            "aggregator_similarity_dropped_total",
            "Similarity records lost after the failure policy gave up",
        )?;
        let failed_attempts = IntCounter::new(
            "aggregator_similarity_publish_failures_total",
            "Failed publish attempts, including ones later retried",
        )?;

        registry.register(Box::new(published.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(failed_attempts.clone()))?;

        Ok(Self {
            published,
            dropped,
            failed_attempts,
        })
    }

    pub fn published(&self) -> u64 {
        self.published.get()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.get()
    }

    pub(crate) fn record_published(&self) {
        self.published.inc();
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.inc();
    }

    pub(crate) fn record_failed_attempt(&self) {
        self.failed_attempts.inc();
    }
}

/// `GET /metrics` in the Prometheus text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
