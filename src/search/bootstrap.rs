//! Makes sure the target collection exists before the consumer starts.

use super::{CollectionSchema, SearchClient, SearchError};
use crate::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    AlreadyExists,
    Created,
}

/// Polls for `schema.name` until `timeout`, creating the collection once it
/// is known to be absent or the deadline passes.
///
/// A definitive not-found ends the poll at once. Any other lookup error is
/// retried every `poll_interval`. Losing a creation race to another instance
/// counts as the collection already existing.
#[instrument(skip(client, schema), fields(collection = %schema.name))]
pub async fn ensure_collection<C>(
    client: &C,
    schema: &CollectionSchema,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<BootstrapOutcome>
where
    C: SearchClient + ?Sized,
{
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        match client.retrieve_collection(&schema.name).await {
            Ok(found) => {
                info!(
                    documents = found.num_documents,
                    "Collection '{}' already exists", schema.name
                );
                return Ok(BootstrapOutcome::AlreadyExists);
            }
            Err(SearchError::NotFound(_)) => {
                info!("Collection '{}' does not exist", schema.name);
                break;
            }
            Err(e) => {
                warn!(error = %e, "Unexpected error checking collection, retrying");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }

    match client.create_collection(schema).await {
        Ok(()) => {
            info!("Collection '{}' has been created", schema.name);
            Ok(BootstrapOutcome::Created)
        }
        Err(SearchError::AlreadyExists(_)) => {
            info!("Collection '{}' was created concurrently", schema.name);
            Ok(BootstrapOutcome::AlreadyExists)
        }
        Err(e) => Err(e.into()),
    }
}
