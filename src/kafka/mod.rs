pub mod connection;
pub mod consumer;
pub mod producer;
pub mod serializer;
pub mod topic_manager;

pub use connection::BrokerConnection;
pub use consumer::KafkaConsumer;
pub use producer::{DeadLetterPublisher, KafkaProducer};
pub use serializer::{EncodedEvent, JsonSerializer};
pub use topic_manager::TopicManager;
