use crate::{Error, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Declares the topics publishers and consumers rely on.
///
/// Declaration is idempotent: a topic that exists, or that another instance
/// creates concurrently, counts as declared.
pub struct TopicManager {
    admin_client: Arc<AdminClient<DefaultClientContext>>,
    default_partitions: i32,
    default_replication_factor: i32,
    metadata_timeout: Duration,
    declared_topics: HashSet<String>,
}

impl TopicManager {
    pub fn new(
        admin_client: Arc<AdminClient<DefaultClientContext>>,
        partitions: i32,
        replication_factor: i32,
        metadata_timeout: Duration,
    ) -> Self {
        Self {
            admin_client,
            default_partitions: partitions,
            default_replication_factor: replication_factor,
            metadata_timeout,
            declared_topics: HashSet::new(),
        }
    }

    #[instrument(skip(self), fields(topic = %topic_name))]
    pub async fn ensure_topic_exists(&mut self, topic_name: &str) -> Result<()> {
        if self.declared_topics.contains(topic_name) {
            debug!("Topic '{}' already verified to exist", topic_name);
            return Ok(());
        }

        match self.topic_exists(topic_name).await {
            Ok(true) => {
                info!("Topic '{}' already exists", topic_name);
            }
            Ok(false) => {
                info!("Creating topic '{}'", topic_name);
                self.create_topic(topic_name).await?;
            }
            Err(e) => {
                warn!("Failed to check if topic '{}' exists: {}", topic_name, e);
                return Err(e);
            }
        }

        self.declared_topics.insert(topic_name.to_string());
        Ok(())
    }

    async fn topic_exists(&self, topic_name: &str) -> Result<bool> {
        let admin_client = self.admin_client.clone();
        let timeout = self.metadata_timeout;
        let topic = topic_name.to_string();

        // Metadata fetches block the calling thread.
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let metadata = admin_client.inner().fetch_metadata(None, timeout)?;
            Ok(metadata.topics().iter().any(|t| t.name() == topic))
        })
        .await
        .map_err(|e| Error::BrokerUnreachable {
            message: format!("metadata fetch aborted: {}", e),
        })?
    }

    async fn create_topic(&self, topic_name: &str) -> Result<()> {
        let new_topic = NewTopic::new(
            topic_name,
            self.default_partitions,
            TopicReplication::Fixed(self.default_replication_factor),
        )
        .set("cleanup.policy", "delete")
        .set("retention.ms", "604800000"); // 7 days

        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(30)));

        let results = self
            .admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(Error::Kafka)?;

        for result in results {
            match result {
                Ok(topic) => {
                    info!("Successfully created topic: {}", topic);
                }
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    info!("Topic '{}' was created concurrently", topic);
                }
                Err((_topic, error)) => {
                    return Err(Error::Kafka(rdkafka::error::KafkaError::AdminOp(error)));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::ClientConfig;

    #[tokio::test]
    #[ignore] // Requires running Kafka
    async fn test_topic_declaration_is_idempotent() {
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", "localhost:9092")
            .create()
            .unwrap();
        let mut manager = TopicManager::new(Arc::new(admin_client), 3, 1, Duration::from_secs(5));

        let topic_name = format!("test-topic-declaration-{}", std::process::id());

        manager.ensure_topic_exists(&topic_name).await.unwrap();
        assert!(manager.topic_exists(&topic_name).await.unwrap());

        // A second manager sees the topic and does not try to recreate it.
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", "localhost:9092")
            .create()
            .unwrap();
        let mut other = TopicManager::new(Arc::new(admin_client), 3, 1, Duration::from_secs(5));
        other.ensure_topic_exists(&topic_name).await.unwrap();
    }
}
