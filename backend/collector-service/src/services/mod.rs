pub mod producer;

pub use producer::{ActionPublisher, KafkaActionProducer};
