#![allow(dead_code)]

use async_trait::async_trait;
use question_sync::config::{Config, ConsumerConfig, KafkaConfig, SearchConfig};
use question_sync::dispatcher::{Acknowledger, DeadLetterSink, Dispatcher, InboundMessage, WorkerPool};
use question_sync::kafka::JsonSerializer;
use question_sync::retry::RetryPolicy;
use question_sync::search::{CollectionSchema, InMemorySearchEngine};
use question_sync::{DomainEvent, EventPublisher, IndexSynchronizer, Result};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::env;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const COLLECTION: &str = "questions";
pub const TOPIC: &str = "questions";

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    // Use TEST_ prefix for test environment variables
    let kafka = KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        topic: format!("test_questions_{}", std::process::id()),
        dead_letter_topic: format!("test_questions_{}.dlq", std::process::id()),
        group_id: format!("test_search_sync_{}", std::process::id()),
        partitions: 3,
        replication_factor: 1,
        compression: "none".to_string(), // No compression for tests
        acks: "all".to_string(),
        linger_ms: 0, // Immediate sending for tests
        message_timeout_ms: 10_000,
        metadata_timeout_ms: 2_000,
        connect_retries: 2,
        connect_backoff_base_secs: 1,
    };

    let search = SearchConfig {
        url: env::var("TEST_TYPESENSE_URL").unwrap_or_else(|_| "http://localhost:8108".to_string()),
        api_key: env::var("TEST_TYPESENSE_API_KEY").unwrap_or_else(|_| "xyz".to_string()),
        collection: format!("test_questions_{}", std::process::id()),
        request_timeout_secs: 5,
        bootstrap_timeout_secs: 10,
        bootstrap_poll_interval_ms: 200,
    };

    let consumer = ConsumerConfig {
        workers: 4,
        handler_max_attempts: 3,
        handler_retry_base_ms: 100,
        ..Default::default()
    };

    Config {
        kafka,
        search,
        consumer,
    }
}

/// Stands in for the broker: an append-only, partitioned log that publishers
/// write to and tests deliver from.
pub struct InMemoryTopic {
    partitions: i32,
    log: Mutex<Vec<InboundMessage>>,
}

impl InMemoryTopic {
    pub fn new(partitions: i32) -> Self {
        Self {
            partitions,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Appends a raw record, assigning the next offset of its partition.
    pub fn append(&self, key: &str, message_type: Option<&str>, payload: Vec<u8>) {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let partition = (hasher.finish() % self.partitions as u64) as i32;

        let mut log = self.log.lock().unwrap();
        let offset = log.iter().filter(|m| m.partition == partition).count() as i64;
        log.push(InboundMessage {
            topic: TOPIC.to_string(),
            partition,
            offset,
            key: Some(key.to_string()),
            message_type: message_type.map(str::to_string),
            payload,
        });
    }

    pub fn messages(&self) -> Vec<InboundMessage> {
        self.log.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    /// Submits every record from `from` onwards to `pool`.
    pub async fn deliver(&self, pool: &WorkerPool, from: usize) {
        for message in self.messages().into_iter().skip(from) {
            pool.submit(message).await.unwrap();
        }
    }
}

#[async_trait]
impl EventPublisher for InMemoryTopic {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let encoded = JsonSerializer::encode(event)?;
        self.append(&encoded.key, Some(encoded.message_type), encoded.payload);
        Ok(())
    }
}

/// Highest acknowledged position per partition.
#[derive(Default)]
pub struct RecordingAcks(Mutex<HashMap<i32, i64>>);

impl RecordingAcks {
    pub fn position(&self, partition: i32) -> Option<i64> {
        self.0.lock().unwrap().get(&partition).copied()
    }
}

impl Acknowledger for RecordingAcks {
    fn acknowledge(&self, _topic: &str, partition: i32, next_offset: i64) -> Result<()> {
        let mut positions = self.0.lock().unwrap();
        let position = positions.entry(partition).or_insert(next_offset);
        *position = (*position).max(next_offset);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDeadLetters(Mutex<Vec<(InboundMessage, String)>>);

impl RecordingDeadLetters {
    pub fn records(&self) -> Vec<(InboundMessage, String)> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingDeadLetters {
    async fn dead_letter(&self, message: &InboundMessage, reason: &str) -> Result<()> {
        self.0
            .lock()
            .unwrap()
            .push((message.clone(), reason.to_string()));
        Ok(())
    }
}

pub struct Pipeline {
    pub engine: Arc<InMemorySearchEngine>,
    pub acks: Arc<RecordingAcks>,
    pub dead_letters: Arc<RecordingDeadLetters>,
    pub pool: WorkerPool,
}

/// A worker pool over an in-memory index that already has its collection.
pub fn pipeline(workers: usize) -> Pipeline {
    let engine = Arc::new(InMemorySearchEngine::with_collection(
        CollectionSchema::questions(COLLECTION),
    ));
    let acks = Arc::new(RecordingAcks::default());
    let dead_letters = Arc::new(RecordingDeadLetters::default());

    let dispatcher = Arc::new(Dispatcher::new(
        IndexSynchronizer::new(engine.clone(), COLLECTION),
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
        },
    ));
    let pool = WorkerPool::spawn(workers, 16, dispatcher, acks.clone(), dead_letters.clone());

    Pipeline {
        engine,
        acks,
        dead_letters,
        pool,
    }
}
