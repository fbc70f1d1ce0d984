// gRPC server implementation for the RecommendationsController service
use crate::repository::ScoredEvent;
use crate::services::RecommendationService;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info};

// Generated proto code
pub mod recommendation {
    tonic::include_proto!("stats.recommendation.v1");
}

use recommendation::recommendations_controller_server::RecommendationsController;
use recommendation::*;

type ScoredEventStream = ReceiverStream<Result<RecommendedEventProto, Status>>;

/// RecommendationsImpl - gRPC service implementation
#[derive(Clone)]
pub struct RecommendationsImpl {
    service: RecommendationService,
}

impl RecommendationsImpl {
    pub fn new(service: RecommendationService) -> Self {
        Self { service }
    }

    /// Helper: stream already-resolved results to the caller
    fn stream(events: Vec<ScoredEvent>) -> Response<ScoredEventStream> {
        let (tx, rx) = mpsc::channel(events.len().clamp(1, 64));

        tokio::spawn(async move {
            for event in events {
                let item = RecommendedEventProto {
                    event_id: event.event_id,
                    score: event.score,
                };
                if tx.send(Ok(item)).await.is_err() {
                    debug!("Client dropped recommendation stream");
                    break;
                }
            }
        });

        Response::new(ReceiverStream::new(rx))
    }

    fn status(operation: &str, err: crate::error::AppError) -> Status {
        error!("{} failed: {}", operation, err);
        Status::from(err)
    }
}

#[tonic::async_trait]
impl RecommendationsController for RecommendationsImpl {
    type GetRecommendationsForUserStream = ScoredEventStream;
    type GetSimilarEventsStream = ScoredEventStream;
    type GetInteractionsCountStream = ScoredEventStream;

    async fn get_recommendations_for_user(
        &self,
        request: Request<UserPredictionsRequestProto>,
    ) -> Result<Response<Self::GetRecommendationsForUserStream>, Status> {
        let req = request.into_inner();
        info!(
            "get_recommendations_for_user: user_id={}, max_results={}",
            req.user_id, req.max_results
        );

        let events = self
            .service
            .recommendations_for_user(req.user_id, req.max_results)
            .await
            .map_err(|e| Self::status("get_recommendations_for_user", e))?;

        Ok(Self::stream(events))
    }

    async fn get_similar_events(
        &self,
        request: Request<SimilarEventsRequestProto>,
    ) -> Result<Response<Self::GetSimilarEventsStream>, Status> {
        let req = request.into_inner();
        info!(
            "get_similar_events: user_id={}, event_id={}, max_results={}",
            req.user_id, req.event_id, req.max_results
        );

        let events = self
            .service
            .similar_events(req.user_id, req.event_id, req.max_results)
            .await
            .map_err(|e| Self::status("get_similar_events", e))?;

        Ok(Self::stream(events))
    }

    async fn get_interactions_count(
        &self,
        request: Request<InteractionsCountRequestProto>,
    ) -> Result<Response<Self::GetInteractionsCountStream>, Status> {
        let req = request.into_inner();
        info!("get_interactions_count: event_count={}", req.event_id.len());

        let events = self
            .service
            .interactions_count(&req.event_id)
            .await
            .map_err(|e| Self::status("get_interactions_count", e))?;

        Ok(Self::stream(events))
    }
}
