//! Publish side of the question events.

use crate::events::DomainEvent;
use crate::kafka::serializer::MESSAGE_TYPE_HEADER;
use crate::kafka::{BrokerConnection, JsonSerializer, KafkaProducer};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Emits an event after the mutation it describes has been committed.
///
/// Returns once the broker has accepted the event. Nothing ties the publish
/// to the commit: an error here means the store changed and the event is
/// lost unless someone replays it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

pub struct KafkaEventPublisher {
    producer: Arc<KafkaProducer>,
    topic: String,
}

impl KafkaEventPublisher {
    pub fn new(producer: Arc<KafkaProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub fn for_connection(connection: &BrokerConnection) -> Self {
        Self::new(connection.producer(), connection.config().topic.clone())
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    #[instrument(skip_all, fields(event_type = %event.kind(), question_id = %event.question_id()))]
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let encoded = JsonSerializer::encode(event)?;
        let headers = [(MESSAGE_TYPE_HEADER, encoded.message_type)];

        match self
            .producer
            .send(&self.topic, &encoded.key, &headers, &encoded.payload)
            .await
        {
            Ok((partition, offset)) => {
                debug!(topic = %self.topic, partition, offset, "Published event");
                Ok(())
            }
            Err(e) => {
                error!(topic = %self.topic, error = %e, "Failed to publish event");
                Err(e)
            }
        }
    }
}
