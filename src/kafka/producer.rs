use crate::config::KafkaConfig;
use crate::dispatcher::{DeadLetterSink, InboundMessage};
use crate::kafka::serializer::{
    DEAD_LETTER_ORIGIN_HEADER, DEAD_LETTER_REASON_HEADER, MESSAGE_TYPE_HEADER,
};
use crate::{Error, Result};
use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("compression.type", &config.compression)
            .set("acks", &config.acks)
            .set("linger.ms", config.linger_ms.to_string())
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(Error::Kafka)?;

        Ok(Self { producer })
    }

    /// Sends one record and waits for the broker's delivery report.
    /// Returns the partition and offset the record was written at.
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        headers: &[(&str, &str)],
        payload: &[u8],
    ) -> Result<(i32, i64)> {
        let headers = headers
            .iter()
            .fold(OwnedHeaders::new(), |acc, (name, value)| {
                acc.insert(Header {
                    key: *name,
                    value: Some(*value),
                })
            });

        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload)
            .headers(headers);

        self.producer
            .send(record, Timeout::Never)
            .await
            .map_err(|(e, _)| Error::Kafka(e))
    }

    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer.flush(Timeout::After(timeout)).map_err(Error::Kafka)
    }
}

/// Forwards messages the dispatcher gave up on to the dead-letter topic,
/// preserving key, payload and type and adding the reason plus origin.
pub struct DeadLetterPublisher {
    producer: Arc<KafkaProducer>,
    topic: String,
}

impl DeadLetterPublisher {
    pub fn new(producer: Arc<KafkaProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterPublisher {
    async fn dead_letter(&self, message: &InboundMessage, reason: &str) -> Result<()> {
        let origin = format!("{}/{}/{}", message.topic, message.partition, message.offset);
        let mut headers = vec![
            (DEAD_LETTER_REASON_HEADER, reason),
            (DEAD_LETTER_ORIGIN_HEADER, origin.as_str()),
        ];
        if let Some(message_type) = message.message_type.as_deref() {
            headers.push((MESSAGE_TYPE_HEADER, message_type));
        }

        let key = message.key.as_deref().unwrap_or("");
        match self
            .producer
            .send(&self.topic, key, &headers, &message.payload)
            .await
        {
            Ok((partition, offset)) => {
                info!(
                    dlq_topic = %self.topic,
                    partition,
                    offset,
                    %origin,
                    reason,
                    "Dead-lettered message"
                );
                Ok(())
            }
            Err(e) => {
                warn!(%origin, error = %e, "Failed to dead-letter message");
                Err(e)
            }
        }
    }
}
