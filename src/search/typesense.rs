//! Typesense implementation of [`SearchClient`] over its REST API.

use super::{
    CollectionInfo, CollectionSchema, DocumentPatch, SearchClient, SearchDocument, SearchError,
    SearchResult,
};
use crate::config::SearchConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

pub struct TypesenseClient {
    base_url: Url,
    api_key: String,
    http_client: Client,
}

impl TypesenseClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| Error::InvalidConfig(format!("search.url '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "search.url '{}' is not a base URL",
                config.url
            )));
        }

        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            http_client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> SearchResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::Rejected {
                status: 0,
                message: format!("'{}' cannot take a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        trace!(%method, %url, "Typesense request");
        self.http_client
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> SearchResult<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Unavailable(format!("{} timed out", what))
            } else {
                SearchError::Unavailable(format!("{}: {}", what, e))
            }
        })?;
        check_status(response, what).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> SearchResult<T> {
        let response = self.send(request, what).await?;
        response.json().await.map_err(|e| SearchError::Rejected {
            status: 200,
            message: format!("{}: unparseable response: {}", what, e),
        })
    }
}

async fn check_status(response: Response, what: &str) -> SearchResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    debug!(status = status.as_u16(), %body, "Typesense rejected {}", what);

    Err(match status {
        StatusCode::NOT_FOUND => SearchError::NotFound(what.to_string()),
        StatusCode::CONFLICT => SearchError::AlreadyExists(what.to_string()),
        StatusCode::TOO_MANY_REQUESTS => SearchError::Unavailable(format!("{}: rate limited", what)),
        s if s.is_server_error() => {
            SearchError::Unavailable(format!("{}: server error ({}): {}", what, s.as_u16(), body))
        }
        s => SearchError::Rejected {
            status: s.as_u16(),
            message: format!("{}: {}", what, body),
        },
    })
}

#[async_trait]
impl SearchClient for TypesenseClient {
    async fn retrieve_collection(&self, name: &str) -> SearchResult<CollectionInfo> {
        let url = self.endpoint(&["collections", name])?;
        self.send_json(
            self.request(Method::GET, url),
            &format!("collection '{}'", name),
        )
        .await
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> SearchResult<()> {
        let url = self.endpoint(&["collections"])?;
        self.send(
            self.request(Method::POST, url).json(schema),
            &format!("collection '{}'", schema.name),
        )
        .await?;
        Ok(())
    }

    async fn upsert_document(
        &self,
        collection: &str,
        document: &SearchDocument,
    ) -> SearchResult<()> {
        let mut url = self.endpoint(&["collections", collection, "documents"])?;
        url.query_pairs_mut().append_pair("action", "upsert");
        self.send(
            self.request(Method::POST, url).json(document),
            &format!("document '{}'", document.id),
        )
        .await?;
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: &DocumentPatch,
    ) -> SearchResult<()> {
        let url = self.endpoint(&["collections", collection, "documents", id])?;
        self.send(
            self.request(Method::PATCH, url).json(patch),
            &format!("document '{}'", id),
        )
        .await?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> SearchResult<()> {
        let url = self.endpoint(&["collections", collection, "documents", id])?;
        self.send(self.request(Method::DELETE, url), &format!("document '{}'", id))
            .await?;
        Ok(())
    }

    async fn retrieve_document(
        &self,
        collection: &str,
        id: &str,
    ) -> SearchResult<SearchDocument> {
        let url = self.endpoint(&["collections", collection, "documents", id])?;
        self.send_json(self.request(Method::GET, url), &format!("document '{}'", id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_config(url: &str) -> SearchConfig {
        SearchConfig {
            url: url.to_string(),
            api_key: "xyz".to_string(),
            collection: "questions".to_string(),
            request_timeout_secs: 1,
            bootstrap_timeout_secs: 60,
            bootstrap_poll_interval_ms: 1000,
        }
    }

    #[test]
    fn test_endpoint_encodes_ids() {
        let client = TypesenseClient::new(&search_config("http://localhost:8108/")).unwrap();
        let url = client
            .endpoint(&["collections", "questions", "documents", "a/b c"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8108/collections/questions/documents/a%2Fb%20c"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = TypesenseClient::new(&search_config("http://search.local/typesense")).unwrap();
        let url = client.endpoint(&["collections"]).unwrap();
        assert_eq!(url.as_str(), "http://search.local/typesense/collections");
    }

    #[test]
    fn test_rejects_invalid_url() {
        let result = TypesenseClient::new(&search_config("not a url"));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    #[ignore] // Requires running Typesense on localhost:8108 with api key "xyz"
    async fn test_collection_round_trip() {
        let client = TypesenseClient::new(&search_config("http://localhost:8108")).unwrap();
        let name = format!("test_questions_{}", std::process::id());
        let schema = CollectionSchema::questions(&name);

        client.create_collection(&schema).await.unwrap();
        let info = client.retrieve_collection(&name).await.unwrap();
        assert_eq!(info.name, name);

        let err = client.create_collection(&schema).await.unwrap_err();
        assert!(matches!(err, SearchError::AlreadyExists(_)));
    }
}
