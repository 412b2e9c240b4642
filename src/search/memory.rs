//! In-memory search engine.
//!
//! Mirrors the error behavior of a real engine (missing collections and
//! documents are `NotFound`, duplicate collections `AlreadyExists`) so the
//! synchronizer can be exercised without a server. Nothing is persisted.

use super::{
    CollectionInfo, CollectionSchema, DocumentPatch, SearchClient, SearchDocument, SearchError,
    SearchResult,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Collection {
    schema: CollectionSchema,
    documents: HashMap<String, SearchDocument>,
}

#[derive(Default)]
pub struct InMemorySearchEngine {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with `schema` already created.
    pub fn with_collection(schema: CollectionSchema) -> Self {
        let mut collections = HashMap::new();
        collections.insert(
            schema.name.clone(),
            Collection {
                schema,
                documents: HashMap::new(),
            },
        );
        Self {
            collections: RwLock::new(collections),
        }
    }

    pub async fn schema(&self, name: &str) -> Option<CollectionSchema> {
        self.collections
            .read()
            .await
            .get(name)
            .map(|c| c.schema.clone())
    }

    pub async fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }
}

fn missing_collection(name: &str) -> SearchError {
    SearchError::NotFound(format!("collection '{}'", name))
}

fn missing_document(id: &str) -> SearchError {
    SearchError::NotFound(format!("document '{}'", id))
}

#[async_trait]
impl SearchClient for InMemorySearchEngine {
    async fn retrieve_collection(&self, name: &str) -> SearchResult<CollectionInfo> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing_collection(name))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            num_documents: collection.documents.len() as u64,
        })
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> SearchResult<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(&schema.name) {
            return Err(SearchError::AlreadyExists(format!(
                "collection '{}'",
                schema.name
            )));
        }
        collections.insert(
            schema.name.clone(),
            Collection {
                schema: schema.clone(),
                documents: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert_document(
        &self,
        collection: &str,
        document: &SearchDocument,
    ) -> SearchResult<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        target
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: &DocumentPatch,
    ) -> SearchResult<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        let document = target
            .documents
            .get_mut(id)
            .ok_or_else(|| missing_document(id))?;
        patch.apply_to(document);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> SearchResult<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        target
            .documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| missing_document(id))
    }

    async fn retrieve_document(
        &self,
        collection: &str,
        id: &str,
    ) -> SearchResult<SearchDocument> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        target
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| missing_document(id))
    }
}
