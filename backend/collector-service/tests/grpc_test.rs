// End-to-end tests of CollectUserAction over a real gRPC channel

use async_trait::async_trait;
use collector_service::grpc::collector::{ActionTypeProto, UserActionProto};
use collector_service::grpc::{
    UserActionControllerClient, UserActionControllerImpl, UserActionControllerServer,
};
use collector_service::services::ActionPublisher;
use collector_service::{AppError, Result};
use event_schema::{ActionEvent, ActionType};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};

#[derive(Default)]
struct MemoryPublisher {
    offline: bool,
    actions: Mutex<Vec<ActionEvent>>,
}

#[async_trait]
impl ActionPublisher for MemoryPublisher {
    async fn publish(&self, action: &ActionEvent) -> Result<()> {
        if self.offline {
            return Err(AppError::Kafka("all brokers down".to_string()));
        }
        self.actions.lock().unwrap().push(action.clone());
        Ok(())
    }
}

async fn start(publisher: Arc<MemoryPublisher>) -> UserActionControllerClient<Channel> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(UserActionControllerServer::new(UserActionControllerImpl::new(
                publisher,
            )))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    UserActionControllerClient::connect(format!("http://{}", addr))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_collect_user_action_round_trip() {
    let publisher = Arc::new(MemoryPublisher::default());
    let mut client = start(publisher.clone()).await;

    client
        .collect_user_action(UserActionProto {
            user_id: 1,
            event_id: 10,
            action_type: ActionTypeProto::ActionLike as i32,
            timestamp: None,
        })
        .await
        .unwrap();

    let actions = publisher.actions.lock().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, ActionType::Like);
    assert_eq!(actions[0].key(), "1");
}

#[tokio::test]
async fn test_collect_user_action_reports_publish_failure() {
    let publisher = Arc::new(MemoryPublisher {
        offline: true,
        ..Default::default()
    });
    let mut client = start(publisher).await;

    let status = client
        .collect_user_action(UserActionProto {
            user_id: 1,
            event_id: 10,
            action_type: ActionTypeProto::ActionView as i32,
            timestamp: None,
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Internal);
}
