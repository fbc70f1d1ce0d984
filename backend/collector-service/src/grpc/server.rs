// gRPC server implementation for the UserActionController service
use crate::error::{AppError, Result};
use crate::services::ActionPublisher;
use chrono::{DateTime, Utc};
use event_schema::{ActionEvent, ActionType};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

// Generated proto code
pub mod collector {
    tonic::include_proto!("stats.collector.v1");
}

use collector::user_action_controller_server::UserActionController;
use collector::*;

#[derive(Clone)]
pub struct UserActionControllerImpl {
    publisher: Arc<dyn ActionPublisher>,
}

impl UserActionControllerImpl {
    pub fn new(publisher: Arc<dyn ActionPublisher>) -> Self {
        Self { publisher }
    }

    /// Helper: map a wire action to the stream record, validating ids and type
    pub fn to_action_event(proto: &UserActionProto) -> Result<ActionEvent> {
        if proto.user_id <= 0 {
            return Err(AppError::Validation(format!(
                "user_id must be positive, got {}",
                proto.user_id
            )));
        }
        if proto.event_id <= 0 {
            return Err(AppError::Validation(format!(
                "event_id must be positive, got {}",
                proto.event_id
            )));
        }

        let action_type = match ActionTypeProto::try_from(proto.action_type) {
            Ok(ActionTypeProto::ActionView) => ActionType::View,
            Ok(ActionTypeProto::ActionRegister) => ActionType::Register,
            Ok(ActionTypeProto::ActionLike) => ActionType::Like,
            _ => {
                return Err(AppError::Validation(format!(
                    "Invalid action_type: {}. Must be one of: VIEW, REGISTER, LIKE",
                    proto.action_type
                )))
            }
        };

        let timestamp = match &proto.timestamp {
            Some(ts) => Self::to_datetime(ts)?,
            None => Utc::now(),
        };

        Ok(ActionEvent {
            user_id: proto.user_id,
            event_id: proto.event_id,
            action_type,
            timestamp,
        })
    }

    fn to_datetime(ts: &prost_types::Timestamp) -> Result<DateTime<Utc>> {
        u32::try_from(ts.nanos)
            .ok()
            .and_then(|nanos| DateTime::from_timestamp(ts.seconds, nanos))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Invalid timestamp: {}s {}ns",
                    ts.seconds, ts.nanos
                ))
            })
    }
}

#[tonic::async_trait]
impl UserActionController for UserActionControllerImpl {
    async fn collect_user_action(
        &self,
        request: Request<UserActionProto>,
    ) -> std::result::Result<Response<()>, Status> {
        let req = request.into_inner();

        let action = Self::to_action_event(&req).map_err(|e| {
            warn!("collect_user_action rejected: {}", e);
            Status::from(e)
        })?;

        self.publisher.publish(&action).await.map_err(|e| {
            Status::internal(format!("Failed to collect user action: {}", e))
        })?;

        info!(
            user_id = action.user_id,
            event_id = action.event_id,
            action_type = %action.action_type,
            "Collected user action"
        );
        Ok(Response::new(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        fail: bool,
        published: Mutex<Vec<ActionEvent>>,
    }

    #[async_trait::async_trait]
    impl ActionPublisher for RecordingPublisher {
        async fn publish(&self, action: &ActionEvent) -> Result<()> {
            if self.fail {
                return Err(AppError::Kafka("delivery timed out".to_string()));
            }
            self.published.lock().unwrap().push(action.clone());
            Ok(())
        }
    }

    fn proto(action_type: ActionTypeProto) -> UserActionProto {
        UserActionProto {
            user_id: 7,
            event_id: 42,
            action_type: action_type as i32,
            timestamp: Some(prost_types::Timestamp {
                seconds: 1_700_000_000,
                nanos: 500,
            }),
        }
    }

    #[test]
    fn test_maps_action_types() {
        let action = UserActionControllerImpl::to_action_event(&proto(ActionTypeProto::ActionRegister))
            .unwrap();
        assert_eq!(action.action_type, ActionType::Register);
        assert_eq!(action.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(action.timestamp.timestamp_subsec_nanos(), 500);

        let action =
            UserActionControllerImpl::to_action_event(&proto(ActionTypeProto::ActionLike)).unwrap();
        assert_eq!(action.action_type, ActionType::Like);
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(UserActionControllerImpl::to_action_event(&proto(
            ActionTypeProto::ActionUnspecified
        ))
        .is_err());

        let mut invalid = proto(ActionTypeProto::ActionView);
        invalid.action_type = 99;
        assert!(UserActionControllerImpl::to_action_event(&invalid).is_err());

        let mut invalid = proto(ActionTypeProto::ActionView);
        invalid.user_id = 0;
        assert!(UserActionControllerImpl::to_action_event(&invalid).is_err());

        let mut invalid = proto(ActionTypeProto::ActionView);
        invalid.timestamp = Some(prost_types::Timestamp {
            seconds: 1,
            nanos: -1,
        });
        assert!(UserActionControllerImpl::to_action_event(&invalid).is_err());
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let mut request = proto(ActionTypeProto::ActionView);
        request.timestamp = None;

        let before = Utc::now();
        let action = UserActionControllerImpl::to_action_event(&request).unwrap();
        assert!(action.timestamp >= before);
    }

    #[tokio::test]
    async fn test_collect_publishes_action() {
        let publisher = Arc::new(RecordingPublisher::default());
        let controller = UserActionControllerImpl::new(publisher.clone());

        controller
            .collect_user_action(Request::new(proto(ActionTypeProto::ActionView)))
            .await
            .unwrap();

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].user_id, 7);
        assert_eq!(published[0].event_id, 42);
    }

    #[tokio::test]
    async fn test_publish_failure_is_internal() {
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let controller = UserActionControllerImpl::new(publisher);

        let status = controller
            .collect_user_action(Request::new(proto(ActionTypeProto::ActionLike)))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);
    }

    #[tokio::test]
    async fn test_invalid_action_is_invalid_argument() {
        let publisher = Arc::new(RecordingPublisher::default());
        let controller = UserActionControllerImpl::new(publisher.clone());

        let status = controller
            .collect_user_action(Request::new(proto(ActionTypeProto::ActionUnspecified)))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(publisher.published.lock().unwrap().is_empty());
    }
}
