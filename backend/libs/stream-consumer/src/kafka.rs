//! Kafka-backed record source

use crate::error::{ConsumerError, ConsumerResult};
use crate::offsets::PartitionOffset;
use crate::{CommitMode, ConsumedRecord, RecordSource};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info};

/// Kafka consumer configuration
#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    /// Kafka brokers (comma-separated)
    pub brokers: String,
    /// Consumer group ID
    pub group_id: String,
    /// Client ID reported to the brokers
    pub client_id: String,
    /// Topics to subscribe to
    pub topics: Vec<String>,
}

/// Kafka consumer with auto-commit disabled; offsets are committed by the
/// [`StreamWorker`](crate::StreamWorker) once records are fully applied.
pub struct KafkaSource {
    consumer: StreamConsumer,
    topics: Vec<String>,
}

impl KafkaSource {
    pub fn new(config: &KafkaSourceConfig) -> ConsumerResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("client.id", &config.client_id)
            .set("enable.auto.commit", "false") // Manual commit after processing
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .set("enable.partition.eof", "false")
            .create()?;

        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topics = ?config.topics,
            "Kafka source created"
        );

        Ok(Self {
            consumer,
            topics: config.topics.clone(),
        })
    }
}

impl From<CommitMode> for rdkafka::consumer::CommitMode {
    fn from(mode: CommitMode) -> Self {
        match mode {
            CommitMode::Async => rdkafka::consumer::CommitMode::Async,
            CommitMode::Sync => rdkafka::consumer::CommitMode::Sync,
        }
    }
}

#[async_trait]
impl RecordSource for KafkaSource {
    async fn subscribe(&mut self) -> ConsumerResult<()> {
        let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics)?;
        info!(topics = ?self.topics, "Subscribed");
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> ConsumerResult<Option<ConsumedRecord>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(ConsumerError::Transport(e.to_string())),
            Ok(Ok(msg)) => {
                debug!(
                    topic = msg.topic(),
                    partition = msg.partition(),
                    offset = msg.offset(),
                    "Received record"
                );
                Ok(Some(ConsumedRecord {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                    key: msg.key().map(<[u8]>::to_vec),
                    payload: msg.payload().map(<[u8]>::to_vec),
                }))
            }
        }
    }

    fn commit(&mut self, offsets: &[PartitionOffset], mode: CommitMode) -> ConsumerResult<()> {
        let mut tpl = TopicPartitionList::new();
        for position in offsets {
            tpl.add_partition_offset(
                &position.topic,
                position.partition,
                Offset::Offset(position.next_offset),
            )?;
        }
        self.consumer.commit(&tpl, mode.into())?;
        Ok(())
    }

    fn close(&mut self) {
        self.consumer.unsubscribe();
        info!(topics = ?self.topics, "Kafka source closed");
    }
}
