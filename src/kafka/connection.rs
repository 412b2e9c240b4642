//! Process-scoped broker connection.
//!
//! [`BrokerConnection::establish`] runs once at startup: it waits for the
//! brokers with bounded exponential backoff, declares the topics, and hands
//! back the shared producer. Everything that publishes or subscribes receives
//! the connection explicitly.

use crate::config::KafkaConfig;
use crate::kafka::consumer::KafkaConsumer;
use crate::kafka::producer::KafkaProducer;
use crate::kafka::topic_manager::TopicManager;
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use rdkafka::admin::AdminClient;
use rdkafka::client::DefaultClientContext;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BrokerConnection {
    config: KafkaConfig,
    producer: Arc<KafkaProducer>,
    broker_count: usize,
}

impl BrokerConnection {
    /// Connects to the brokers and declares the topology.
    ///
    /// Unreachable brokers are retried `connect_retries` times with doubling
    /// delays; configuration errors fail immediately. Either way a failure
    /// here is meant to abort startup.
    pub async fn establish(config: &KafkaConfig) -> Result<Self> {
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .create()
            .map_err(Error::Kafka)?;
        let admin_client = Arc::new(admin_client);

        let policy =
            RetryPolicy::broker_connect(config.connect_retries, config.connect_backoff_base_secs);
        let broker_count = policy
            .run("Broker connection", || {
                probe_brokers(admin_client.clone(), config.metadata_timeout())
            })
            .await
            .map_err(|e| {
                error!(
                    brokers = %config.bootstrap_servers(),
                    error = %e,
                    "Could not connect to the message broker"
                );
                e
            })?;
        info!(
            brokers = %config.bootstrap_servers(),
            broker_count,
            "Connected to message broker"
        );

        let mut topics = TopicManager::new(
            admin_client,
            config.partitions,
            config.replication_factor,
            config.metadata_timeout(),
        );
        topics.ensure_topic_exists(&config.topic).await?;
        topics.ensure_topic_exists(&config.dead_letter_topic).await?;

        let producer = Arc::new(KafkaProducer::new(config)?);

        Ok(Self {
            config: config.clone(),
            producer,
            broker_count,
        })
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    pub fn broker_count(&self) -> usize {
        self.broker_count
    }

    pub fn producer(&self) -> Arc<KafkaProducer> {
        self.producer.clone()
    }

    /// A consumer in the configured group, subscribed to the events topic.
    pub fn subscribe(&self) -> Result<KafkaConsumer> {
        KafkaConsumer::subscribe(&self.config)
    }

    /// Flushes records still queued in the producer.
    pub fn close(self) -> Result<()> {
        info!("Closing broker connection");
        self.producer.flush(CLOSE_FLUSH_TIMEOUT)
    }
}

/// One connection attempt: a metadata round trip to any bootstrap broker.
async fn probe_brokers(
    admin_client: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
) -> Result<usize> {
    let fetched = tokio::task::spawn_blocking(move || {
        admin_client
            .inner()
            .fetch_metadata(None, timeout)
            .map(|metadata| metadata.brokers().len())
    })
    .await
    .map_err(|e| Error::BrokerUnreachable {
        message: format!("metadata probe aborted: {}", e),
    })?;

    fetched.map_err(|e| {
        let err = Error::Kafka(e);
        if err.is_transient() {
            Error::BrokerUnreachable {
                message: err.to_string(),
            }
        } else {
            err
        }
    })
}
