//! Routes consumed messages to the index synchronizer.
//!
//! [`Dispatcher`] handles one message: decode, apply with in-process
//! redelivery on transient failures, and decide what happens to it.
//! [`WorkerPool`] runs dispatchers on a fixed set of lanes. A message's lane
//! is picked from its key, so events for one question apply in the order
//! they arrived while different questions proceed in parallel.
//!
//! A message is acknowledged once it is applied, skipped as an unknown
//! type, or safely on the dead-letter topic. A message that could be
//! neither applied nor dead-lettered is never acknowledged; its partition's
//! commit position stays behind it and the broker redelivers it after a
//! restart.

use crate::events::EventKind;
use crate::kafka::serializer::JsonSerializer;
use crate::offsets::OffsetTracker;
use crate::retry::RetryPolicy;
use crate::sync::IndexSynchronizer;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

/// A consumed record, detached from the transport it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub message_type: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Applied(EventKind),
    /// Acknowledged without processing.
    Skipped(String),
    /// Must go to the dead-letter topic before it can be acknowledged.
    DeadLetter(String),
}

/// Acknowledges a partition up to, not including, `next_offset`.
pub trait Acknowledger: Send + Sync {
    fn acknowledge(&self, topic: &str, partition: i32, next_offset: i64) -> Result<()>;
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(&self, message: &InboundMessage, reason: &str) -> Result<()>;
}

pub struct Dispatcher {
    synchronizer: IndexSynchronizer,
    redelivery: RetryPolicy,
}

impl Dispatcher {
    pub fn new(synchronizer: IndexSynchronizer, redelivery: RetryPolicy) -> Self {
        Self {
            synchronizer,
            redelivery,
        }
    }

    #[instrument(
        skip_all,
        fields(topic = %message.topic, partition = message.partition, offset = message.offset)
    )]
    pub async fn dispatch(&self, message: &InboundMessage) -> Disposition {
        let event = match JsonSerializer::decode(message.message_type.as_deref(), &message.payload)
        {
            Ok(event) => event,
            Err(Error::UnknownEventType(name)) => {
                warn!(message_type = %name, "No handler for event type, acknowledging");
                return Disposition::Skipped(format!("unknown event type '{}'", name));
            }
            Err(e) => {
                warn!(error = %e, "Undecodable message");
                return Disposition::DeadLetter(format!("undecodable message: {}", e));
            }
        };

        let kind = event.kind();
        match self
            .redelivery
            .run(kind.as_str(), || self.synchronizer.apply(&event))
            .await
        {
            Ok(()) => {
                debug!(event_type = %kind, question_id = %event.question_id(), "Applied event");
                Disposition::Applied(kind)
            }
            Err(e) => {
                error!(
                    event_type = %kind,
                    question_id = %event.question_id(),
                    error = %e,
                    "Giving up on event"
                );
                Disposition::DeadLetter(format!("{} failed: {}", kind, e))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchStats {
    applied: AtomicU64,
    skipped: AtomicU64,
    dead_lettered: AtomicU64,
    unsettled: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub applied: u64,
    pub skipped: u64,
    pub dead_lettered: u64,
    /// Neither applied nor dead-lettered; left for redelivery.
    pub unsettled: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            unsettled: self.unsettled.load(Ordering::Relaxed),
        }
    }
}

struct Lane {
    dispatcher: Arc<Dispatcher>,
    acknowledger: Arc<dyn Acknowledger>,
    dead_letters: Arc<dyn DeadLetterSink>,
    offsets: Arc<Mutex<OffsetTracker>>,
    stats: Arc<DispatchStats>,
}

impl Lane {
    async fn run(self, mut inbox: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbox.recv().await {
            if self.settle(&message).await {
                self.acknowledge(&message);
            }
        }
    }

    async fn settle(&self, message: &InboundMessage) -> bool {
        match self.dispatcher.dispatch(message).await {
            Disposition::Applied(_) => {
                self.stats.applied.fetch_add(1, Ordering::Relaxed);
                true
            }
            Disposition::Skipped(_) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Disposition::DeadLetter(reason) => {
                match self.dead_letters.dead_letter(message, &reason).await {
                    Ok(()) => {
                        self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                        true
                    }
                    Err(e) => {
                        self.stats.unsettled.fetch_add(1, Ordering::Relaxed);
                        error!(
                            topic = %message.topic,
                            partition = message.partition,
                            offset = message.offset,
                            error = %e,
                            "Message neither applied nor dead-lettered; leaving it unacknowledged"
                        );
                        false
                    }
                }
            }
        }
    }

    fn acknowledge(&self, message: &InboundMessage) {
        let next = self
            .offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .complete(&message.topic, message.partition, message.offset);

        if let Some(next_offset) = next {
            if let Err(e) = self
                .acknowledger
                .acknowledge(&message.topic, message.partition, next_offset)
            {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    next_offset,
                    error = %e,
                    "Failed to store offset"
                );
            }
        }
    }
}

pub struct WorkerPool {
    lanes: Vec<mpsc::Sender<InboundMessage>>,
    workers: Vec<JoinHandle<()>>,
    offsets: Arc<Mutex<OffsetTracker>>,
    stats: Arc<DispatchStats>,
}

impl WorkerPool {
    pub fn spawn(
        workers: usize,
        lane_capacity: usize,
        dispatcher: Arc<Dispatcher>,
        acknowledger: Arc<dyn Acknowledger>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        let offsets = Arc::new(Mutex::new(OffsetTracker::new()));
        let stats = Arc::new(DispatchStats::default());

        let (lanes, handles) = (0..workers.max(1))
            .map(|_| {
                let (tx, rx) = mpsc::channel(lane_capacity.max(1));
                let lane = Lane {
                    dispatcher: dispatcher.clone(),
                    acknowledger: acknowledger.clone(),
                    dead_letters: dead_letters.clone(),
                    offsets: offsets.clone(),
                    stats: stats.clone(),
                };
                (tx, tokio::spawn(lane.run(rx)))
            })
            .unzip();

        Self {
            lanes,
            workers: handles,
            offsets,
            stats,
        }
    }

    /// Queues `message` on its lane, waiting while the lane is full.
    pub async fn submit(&self, message: InboundMessage) -> Result<()> {
        self.offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .begin(&message.topic, message.partition, message.offset);

        let lane = lane_for(&message, self.lanes.len());
        self.lanes[lane]
            .send(message)
            .await
            .map_err(|_| Error::Shutdown)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops accepting messages and waits for queued ones to finish.
    pub async fn shutdown(self) -> StatsSnapshot {
        drop(self.lanes);
        for result in futures::future::join_all(self.workers).await {
            if let Err(e) = result {
                error!("Dispatcher lane panicked: {}", e);
            }
        }
        self.stats.snapshot()
    }
}

fn lane_for(message: &InboundMessage, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    match &message.key {
        Some(key) => key.hash(&mut hasher),
        None => (message.topic.as_str(), message.partition).hash(&mut hasher),
    }
    (hasher.finish() % lanes as u64) as usize
}
