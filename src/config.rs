use crate::retry::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub search: SearchConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u32,
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_connect_backoff_base_secs")]
    pub connect_backoff_base_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_bootstrap_timeout_secs")]
    pub bootstrap_timeout_secs: u64,
    #[serde(default = "default_bootstrap_poll_interval_ms")]
    pub bootstrap_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_lane_capacity")]
    pub lane_capacity: usize,
    #[serde(default = "default_handler_max_attempts")]
    pub handler_max_attempts: u32,
    #[serde(default = "default_handler_retry_base_ms")]
    pub handler_retry_base_ms: u64,
    #[serde(default = "default_handler_retry_max_ms")]
    pub handler_retry_max_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            lane_capacity: default_lane_capacity(),
            handler_max_attempts: default_handler_max_attempts(),
            handler_retry_base_ms: default_handler_retry_base_ms(),
            handler_retry_max_ms: default_handler_retry_max_ms(),
        }
    }
}

impl Config {
    /// Loads the TOML file at `path` (if present) overlaid with
    /// `QUESTION_SYNC__SECTION__KEY` environment variables.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("QUESTION_SYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.is_empty() {
            return Err(Error::InvalidConfig(
                "kafka.brokers must list at least one broker".to_string(),
            ));
        }
        if self.kafka.topic == self.kafka.dead_letter_topic {
            return Err(Error::InvalidConfig(
                "kafka.dead_letter_topic must differ from kafka.topic".to_string(),
            ));
        }
        if self.consumer.workers == 0 {
            return Err(Error::InvalidConfig(
                "consumer.workers must be at least 1".to_string(),
            ));
        }
        if self.consumer.handler_max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "consumer.handler_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl KafkaConfig {
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }
}

impl SearchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs)
    }

    pub fn bootstrap_poll_interval(&self) -> Duration {
        Duration::from_millis(self.bootstrap_poll_interval_ms)
    }
}

impl ConsumerConfig {
    /// In-lane redelivery for handlers failing transiently.
    pub fn redelivery(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.handler_max_attempts.saturating_sub(1),
            base_delay: Duration::from_millis(self.handler_retry_base_ms),
            max_delay: Duration::from_millis(self.handler_retry_max_ms),
        }
    }
}

fn default_topic() -> String {
    "questions".to_string()
}

fn default_dead_letter_topic() -> String {
    "questions.dlq".to_string()
}

fn default_group_id() -> String {
    "search-sync".to_string()
}

fn default_partitions() -> i32 {
    6
}

fn default_replication_factor() -> i32 {
    1
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_linger_ms() -> u32 {
    5
}

fn default_message_timeout_ms() -> u32 {
    30_000
}

fn default_metadata_timeout_ms() -> u64 {
    5_000
}

fn default_connect_retries() -> u32 {
    5
}

fn default_connect_backoff_base_secs() -> u64 {
    2
}

fn default_collection() -> String {
    "questions".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_bootstrap_timeout_secs() -> u64 {
    60
}

fn default_bootstrap_poll_interval_ms() -> u64 {
    1_000
}

fn default_workers() -> usize {
    8
}

fn default_lane_capacity() -> usize {
    64
}

fn default_handler_max_attempts() -> u32 {
    5
}

fn default_handler_retry_base_ms() -> u64 {
    500
}

fn default_handler_retry_max_ms() -> u64 {
    10_000
}
