pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod offsets;
pub mod publisher;
pub mod questions;
pub mod retry;
pub mod sync;

pub mod kafka;
pub mod search;

pub use config::Config;
pub use dispatcher::{Dispatcher, WorkerPool};
pub use error::{Error, Result};
pub use events::{DomainEvent, EventKind};
pub use publisher::{EventPublisher, KafkaEventPublisher};
pub use sync::IndexSynchronizer;
