//! Error types and result handling for question-sync.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use question_sync::{Error, Result};
//!
//! fn connect_to_broker() -> Result<()> {
//!     Err(Error::BrokerUnreachable {
//!         message: "all brokers down".to_string(),
//!     })
//! }
//!
//! match connect_to_broker() {
//!     Ok(()) => println!("Connected"),
//!     Err(e) if e.is_transient() => eprintln!("Will retry: {}", e),
//!     Err(e) => eprintln!("Fatal: {}", e),
//! }
//! ```

use crate::search::SearchError;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;

/// The main error type for question-sync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Kafka client, producer or consumer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// The broker could not be reached during startup.
    #[error("Broker unreachable: {message}")]
    BrokerUnreachable {
        /// What the last connection attempt reported
        message: String,
    },

    /// JSON serialization error when encoding or decoding events.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically reading an event file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The search engine rejected or failed a request.
    #[error("Search engine error: {0}")]
    Search(#[from] SearchError),

    /// A message carried an event type no handler is registered for.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// A message could not be routed or decoded.
    #[error("Invalid message format: {message}")]
    InvalidMessage {
        /// Description of what was invalid
        message: String,
    },

    /// A partial update targeted a document that is not in the index yet.
    ///
    /// Usually an update overtook the create for the same question; the
    /// dispatcher retries these.
    #[error("Search document '{id}' does not exist")]
    DocumentMissing {
        /// Question identifier the update was aimed at
        id: String,
    },

    /// An entity in the question store does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of entity, e.g. "question"
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The requested mutation conflicts with the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The worker pool is shutting down and no longer accepts messages.
    #[error("Shutdown in progress")]
    Shutdown,
}

impl Error {
    /// Whether retrying the failed operation later can succeed.
    ///
    /// Broker transport failures, search engine outages and updates that
    /// raced ahead of their document are transient. Everything else needs a
    /// different input or an operator.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::BrokerUnreachable { .. } => true,
            Error::DocumentMissing { .. } => true,
            Error::Kafka(e) => is_transient_kafka(e),
            Error::Search(e) => e.is_transient(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

fn is_transient_kafka(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::BrokerTransportFailure
                | RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::Resolve
                | RDKafkaErrorCode::OperationTimedOut
                | RDKafkaErrorCode::RequestTimedOut
                | RDKafkaErrorCode::MessageTimedOut
                | RDKafkaErrorCode::BrokerNotAvailable
                | RDKafkaErrorCode::LeaderNotAvailable
                | RDKafkaErrorCode::NetworkException
        )
    )
}

/// A convenient Result type alias for question-sync operations.
///
/// This is equivalent to `std::result::Result<T, question_sync::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
