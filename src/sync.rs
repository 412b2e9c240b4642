//! Applies domain events to the question search index.
//!
//! Every handler is idempotent: applying an event twice leaves the document
//! as applying it once did. Partial updates name exactly the fields their
//! event owns and never create a document, so an update that overtakes its
//! create fails with [`Error::DocumentMissing`] instead of indexing a
//! half-populated record.

use crate::events::{
    AnswerAccepted, AnswerCountUpdated, DomainEvent, QuestionCreated, QuestionDeleted,
    QuestionUpdated,
};
use crate::search::{DocumentPatch, SearchClient, SearchDocument, SearchError};
use crate::{Error, Result};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]*>").expect("markup pattern is valid"));

/// Removes every `<...>` tag, keeping the text between them.
pub fn strip_markup(content: &str) -> String {
    MARKUP_TAG.replace_all(content, "").into_owned()
}

pub struct IndexSynchronizer {
    client: Arc<dyn SearchClient>,
    collection: String,
}

impl IndexSynchronizer {
    pub fn new(client: Arc<dyn SearchClient>, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn apply(&self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::QuestionCreated(e) => self.question_created(e).await,
            DomainEvent::QuestionUpdated(e) => self.question_updated(e).await,
            DomainEvent::QuestionDeleted(e) => self.question_deleted(e).await,
            DomainEvent::AnswerCountUpdated(e) => self.answer_count_updated(e).await,
            DomainEvent::AnswerAccepted(e) => self.answer_accepted(e).await,
        }
    }

    /// Indexes a new question. If the document is already there (a replayed
    /// create), only the fields this event owns are rewritten so answer
    /// state recorded since is kept.
    async fn question_created(&self, event: &QuestionCreated) -> Result<()> {
        let content = strip_markup(&event.content);
        let created_at = event.created_at.timestamp();
        let owned_fields = DocumentPatch {
            title: Some(event.title.clone()),
            content: Some(content.clone()),
            tags: Some(event.tags.clone()),
            created_at: Some(created_at),
            ..Default::default()
        };

        match self
            .client
            .update_document(&self.collection, &event.question_id, &owned_fields)
            .await
        {
            Ok(()) => {
                debug!(question_id = %event.question_id, "Question already indexed, refreshed");
                return Ok(());
            }
            Err(SearchError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let document = SearchDocument {
            id: event.question_id.clone(),
            title: event.title.clone(),
            content,
            tags: event.tags.clone(),
            created_at,
            answer_count: 0,
            has_accepted_answer: false,
        };
        self.client
            .upsert_document(&self.collection, &document)
            .await?;
        info!(question_id = %event.question_id, "Indexed question");
        Ok(())
    }

    async fn question_updated(&self, event: &QuestionUpdated) -> Result<()> {
        let patch = DocumentPatch {
            title: Some(event.title.clone()),
            content: Some(strip_markup(&event.content)),
            tags: Some(event.tags.clone()),
            ..Default::default()
        };
        self.patch(&event.question_id, &patch).await
    }

    async fn question_deleted(&self, event: &QuestionDeleted) -> Result<()> {
        match self
            .client
            .delete_document(&self.collection, &event.question_id)
            .await
        {
            Ok(()) => {
                info!(question_id = %event.question_id, "Removed question from index");
                Ok(())
            }
            Err(SearchError::NotFound(_)) => {
                debug!(question_id = %event.question_id, "Question already absent from index");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn answer_count_updated(&self, event: &AnswerCountUpdated) -> Result<()> {
        let patch = DocumentPatch {
            answer_count: Some(event.answer_count),
            ..Default::default()
        };
        self.patch(&event.question_id, &patch).await
    }

    // There is no inverse event, so nothing ever resets this to false.
    async fn answer_accepted(&self, event: &AnswerAccepted) -> Result<()> {
        let patch = DocumentPatch {
            has_accepted_answer: Some(true),
            ..Default::default()
        };
        self.patch(&event.question_id, &patch).await
    }

    async fn patch(&self, id: &str, patch: &DocumentPatch) -> Result<()> {
        match self.client.update_document(&self.collection, id, patch).await {
            Ok(()) => {
                debug!(question_id = %id, ?patch, "Patched search document");
                Ok(())
            }
            Err(SearchError::NotFound(_)) => Err(Error::DocumentMissing { id: id.to_string() }),
            Err(e) => Err(e.into()),
        }
    }
}
