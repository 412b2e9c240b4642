//! The search engine seam.
//!
//! The index synchronizer only needs document CRUD plus collection lookup
//! and creation, captured by [`SearchClient`]. [`TypesenseClient`] talks to a
//! real engine; [`InMemorySearchEngine`] backs tests.

pub mod bootstrap;
pub mod memory;
pub mod typesense;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bootstrap::{ensure_collection, BootstrapOutcome};
pub use memory::InMemorySearchEngine;
pub use typesense::TypesenseClient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Connection failure, timeout or a 5xx response.
    #[error("search engine unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl SearchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SearchError::Unavailable(_))
    }
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Denormalized, search-optimized projection of one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub id: String,
    pub title: String,
    /// Plain text; markup is stripped before indexing.
    pub content: String,
    pub tags: Vec<String>,
    /// Seconds since the Unix epoch.
    pub created_at: i64,
    #[serde(default)]
    pub answer_count: i32,
    #[serde(default)]
    pub has_accepted_answer: bool,
}

/// A partial update. Only fields set to `Some` are sent, so the engine
/// leaves every other field of the stored document untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_accepted_answer: Option<bool>,
}

impl DocumentPatch {
    pub fn apply_to(&self, document: &mut SearchDocument) {
        if let Some(title) = &self.title {
            document.title.clone_from(title);
        }
        if let Some(content) = &self.content {
            document.content.clone_from(content);
        }
        if let Some(tags) = &self.tags {
            document.tags.clone_from(tags);
        }
        if let Some(created_at) = self.created_at {
            document.created_at = created_at;
        }
        if let Some(count) = self.answer_count {
            document.answer_count = count;
        }
        if let Some(accepted) = self.has_accepted_answer {
            document.has_accepted_answer = accepted;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "string[]")]
    StringArray,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "bool")]
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<Field>,
    pub default_sorting_field: String,
}

impl CollectionSchema {
    /// Schema of the question index, sorted by creation time by default.
    pub fn questions(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: vec![
                Field::new("id", FieldType::String),
                Field::new("title", FieldType::String),
                Field::new("content", FieldType::String),
                Field::new("tags", FieldType::StringArray),
                Field::new("createdAt", FieldType::Int64),
                Field::new("answerCount", FieldType::Int32),
                Field::new("hasAcceptedAnswer", FieldType::Bool),
            ],
            default_sorting_field: "createdAt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(default)]
    pub num_documents: u64,
}

/// Document CRUD and collection management on a search engine.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// `Err(SearchError::NotFound)` is the definitive "collection absent"
    /// answer; any other error says nothing about existence.
    async fn retrieve_collection(&self, name: &str) -> SearchResult<CollectionInfo>;

    /// Fails with `AlreadyExists` if another instance won the race.
    async fn create_collection(&self, schema: &CollectionSchema) -> SearchResult<()>;

    /// Creates the document, or replaces it wholesale if the id exists.
    async fn upsert_document(&self, collection: &str, document: &SearchDocument)
        -> SearchResult<()>;

    /// Fails with `NotFound` if no document has this id; never creates one.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: &DocumentPatch,
    ) -> SearchResult<()>;

    async fn delete_document(&self, collection: &str, id: &str) -> SearchResult<()>;

    async fn retrieve_document(&self, collection: &str, id: &str)
        -> SearchResult<SearchDocument>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = DocumentPatch {
            answer_count: Some(2),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({"answerCount": 2})
        );
    }

    #[test]
    fn test_schema_wire_format() {
        let json = serde_json::to_value(CollectionSchema::questions("questions")).unwrap();
        assert_eq!(json["name"], "questions");
        assert_eq!(json["default_sorting_field"], "createdAt");
        assert_eq!(json["fields"][3]["name"], "tags");
        assert_eq!(json["fields"][3]["type"], "string[]");
        assert_eq!(json["fields"][4]["type"], "int64");
    }
}
