use crate::config::KafkaConfig;
use crate::dispatcher::{Acknowledger, InboundMessage, StatsSnapshot, WorkerPool};
use crate::kafka::serializer::MESSAGE_TYPE_HEADER;
use crate::{Error, Result};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{Headers, Message};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Group member reading the events topic.
///
/// Offsets are only stored once the worker pool acknowledges them and are
/// committed in the background from there, so a crash replays everything
/// after the last acknowledged position.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaConsumer {
    pub fn subscribe(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(Error::Kafka)?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(Error::Kafka)?;
        info!(topic = %config.topic, group = %config.group_id, "Subscribed");

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Feeds received messages into `pool` until `shutdown` resolves, then
    /// drains the pool and commits what it acknowledged.
    pub async fn run<F>(&self, pool: WorkerPool, shutdown: F) -> Result<StatsSnapshot>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut failure = None;

        loop {
            let inbound = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, draining in-flight messages");
                    break;
                }
                received = self.consumer.recv() => match received {
                    Ok(message) => inbound_message(&message),
                    // librdkafka reconnects on its own; nothing to do but report.
                    Err(e) => {
                        warn!(error = %e, "Error receiving message");
                        continue;
                    }
                },
            };

            if let Err(e) = pool.submit(inbound).await {
                error!(error = %e, "Worker pool stopped accepting messages");
                failure = Some(e);
                break;
            }
        }

        let stats = pool.shutdown().await;
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => debug!("Committed consumer offsets"),
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                debug!("No new offsets to commit")
            }
            Err(e) => warn!(error = %e, "Final offset commit failed"),
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

impl Acknowledger for KafkaConsumer {
    fn acknowledge(&self, topic: &str, partition: i32, next_offset: i64) -> Result<()> {
        let mut positions = TopicPartitionList::new();
        positions.add_partition_offset(topic, partition, Offset::Offset(next_offset))?;
        self.consumer.store_offsets(&positions)?;
        debug!(topic, partition, next_offset, "Stored offset");
        Ok(())
    }
}

fn inbound_message<M: Message>(message: &M) -> InboundMessage {
    let message_type = message.headers().and_then(|headers| {
        headers
            .iter()
            .find(|header| header.key == MESSAGE_TYPE_HEADER)
            .and_then(|header| header.value)
            .and_then(|value| std::str::from_utf8(value).ok())
            .map(str::to_string)
    });

    InboundMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message
            .key()
            .map(|key| String::from_utf8_lossy(key).into_owned()),
        message_type,
        payload: message.payload().unwrap_or_default().to_vec(),
    }
}
